use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

impl GalleyError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, GalleyError>;
