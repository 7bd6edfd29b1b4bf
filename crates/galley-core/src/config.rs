use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Shape of one producer/consumer run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SimulationConfig {
    #[serde(default = "SimulationConfig::default_producers")]
    pub producers: usize,
    #[serde(default = "SimulationConfig::default_consumers")]
    pub consumers: usize,
    /// Time a producer spends manufacturing one item.
    #[serde(default = "SimulationConfig::default_production_latency_ms")]
    pub production_latency_ms: u64,
    /// Time a consumer spends processing one item, outside the queue lock.
    #[serde(default = "SimulationConfig::default_consumption_latency_ms")]
    pub consumption_latency_ms: u64,
    /// Items each producer makes before stopping. Unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_per_producer: Option<u64>,
    /// Queue capacity. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    /// Stop the run after this many seconds. Runs until signalled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_for_secs: Option<u64>,
}

impl SimulationConfig {
    fn default_producers() -> usize {
        2
    }

    fn default_consumers() -> usize {
        3
    }

    fn default_production_latency_ms() -> u64 {
        3000
    }

    fn default_consumption_latency_ms() -> u64 {
        4000
    }

    pub fn production_latency(&self) -> Duration {
        Duration::from_millis(self.production_latency_ms)
    }

    pub fn consumption_latency(&self) -> Duration {
        Duration::from_millis(self.consumption_latency_ms)
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs.map(Duration::from_secs)
    }

    /// Total items the run will produce, if every producer has a budget.
    pub fn expected_items(&self) -> Option<u64> {
        self.items_per_producer
            .map(|per| per.saturating_mul(self.producers as u64))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            producers: Self::default_producers(),
            consumers: Self::default_consumers(),
            production_latency_ms: Self::default_production_latency_ms(),
            consumption_latency_ms: Self::default_consumption_latency_ms(),
            items_per_producer: None,
            capacity: None,
            run_for_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("GALLEY_ENV")
            .ok()
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        anyhow::ensure!(sim.producers > 0, "simulation.producers must be > 0");
        anyhow::ensure!(sim.consumers > 0, "simulation.consumers must be > 0");
        anyhow::ensure!(
            sim.capacity != Some(0),
            "simulation.capacity must be > 0 when set"
        );
        anyhow::ensure!(
            sim.items_per_producer != Some(0),
            "simulation.items_per_producer must be > 0 when set"
        );
        anyhow::ensure!(
            !self.logging.level.trim().is_empty(),
            "logging.level cannot be empty"
        );
        Ok(())
    }

    /// Default configuration directory: `./config` when it exists, otherwise
    /// the current directory.
    pub fn default_config_dir() -> PathBuf {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            return project_config;
        }
        cwd
    }

    /// Load settings from `config_dir` and the environment, then validate.
    ///
    /// Sources, later ones winning:
    /// 1. `default.{toml,yaml,yml,json}`
    /// 2. `{env}.{toml,yaml,yml,json}`
    /// 3. `local.toml`
    /// 4. `GALLEY__*` environment variables (`GALLEY__SIMULATION__PRODUCERS=4`)
    pub fn load(config_dir: &Path, env_override: Option<&str>) -> Result<Settings> {
        let settings = Self::load_unvalidated(config_dir, env_override)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Same layering as [`load`](Self::load) without validation, for callers
    /// that apply further overrides (command-line flags) before validating.
    pub fn load_unvalidated(config_dir: &Path, env_override: Option<&str>) -> Result<Settings> {
        let env_name = env_override
            .map(str::to_string)
            .unwrap_or_else(Self::default_env);
        Self::load_from_sources(config_dir, &env_name)
    }

    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let mut builder = cfg::Config::builder().set_default("env", env_name)?;
        for stem in ["default", env_name] {
            for ext in ["toml", "yaml", "yml", "json"] {
                builder = builder.add_source(
                    cfg::File::from(config_dir.join(format!("{}.{}", stem, ext))).required(false),
                );
            }
        }
        let settings: Settings = builder
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                cfg::Environment::with_prefix("GALLEY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing settings to TOML")
    }

    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Settings);
        serde_json::to_string_pretty(&schema).context("serializing settings schema")
    }
}
