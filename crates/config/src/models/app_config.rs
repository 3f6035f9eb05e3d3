use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    message_queue::MessageQueueConfig,
    run::{CollectorConfig, ProducerConfig, ReportConfig, SimulationConfig},
};
use crate::validation::ConfigValidator;
use cropbatch_errors::CropbatchResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub message_queue: MessageQueueConfig,
    pub producer: ProducerConfig,
    pub collector: CollectorConfig,
    pub simulation: SimulationConfig,
    pub report: ReportConfig,
}

impl AppConfig {
    /// Load from an explicit TOML file, the default locations, and
    /// `CROPBATCH__`-prefixed environment overrides, in that precedence
    /// order.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                anyhow::bail!("config file does not exist: {path}");
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/cropbatch.toml", "/etc/cropbatch/config.toml"];
            for path in default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CROPBATCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .context("failed to assemble configuration sources")?;
        let app_config: AppConfig = config
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        Ok(app_config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> CropbatchResult<()> {
        self.message_queue.validate()?;
        self.producer.validate()?;
        self.collector.validate()?;
        self.simulation.validate()?;
        self.report.validate()?;
        Ok(())
    }
}
