pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use cancel::*;
pub use self::config::{LogFormat, LoggingConfig, Settings, SimulationConfig};
pub use error::*;
pub use logging::init_tracing;
pub use types::*;
