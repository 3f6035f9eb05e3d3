use cropbatch_domain::SentinelProtocol;
use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use cropbatch_errors::{CropbatchError, CropbatchResult};

/// One soil-temperature model variant to fan a treatment out over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVariantConfig {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Path to the trial setup file the typed records come from.
    pub trial_file: String,
    /// Model variants each treatment is expanded into; one job per
    /// (treatment, variant) pair. An empty list means one job per treatment.
    #[serde(default)]
    pub model_variants: Vec<ModelVariantConfig>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            trial_file: "data/trial.json".to_string(),
            model_variants: Vec::new(),
        }
    }
}

impl ConfigValidator for ProducerConfig {
    fn validate(&self) -> CropbatchResult<()> {
        ValidationUtils::validate_not_empty(&self.trial_file, "producer.trial_file")?;
        for variant in &self.model_variants {
            ValidationUtils::validate_not_empty(&variant.name, "producer.model_variants.name")?;
            ValidationUtils::validate_not_empty(&variant.code, "producer.model_variants.code")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Applied to each individual receive call, not to the run as a whole.
    pub receive_timeout_ms: u64,
    pub sentinel_protocol: SentinelProtocol,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            // 10 minutes, the operational default of the original runs.
            receive_timeout_ms: 600_000,
            sentinel_protocol: SentinelProtocol::Counted,
        }
    }
}

impl ConfigValidator for CollectorConfig {
    fn validate(&self) -> CropbatchResult<()> {
        ValidationUtils::validate_timeout_ms(self.receive_timeout_ms, "collector.receive_timeout_ms")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub layer_thickness_m: f64,
    pub number_of_layers: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            layer_thickness_m: 0.1,
            number_of_layers: 20,
        }
    }
}

impl ConfigValidator for SimulationConfig {
    fn validate(&self) -> CropbatchResult<()> {
        ValidationUtils::validate_positive(self.layer_thickness_m, "simulation.layer_thickness_m")?;
        if self.number_of_layers == 0 {
            return Err(CropbatchError::config_error(
                "simulation.number_of_layers must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: "out".to_string(),
        }
    }
}

impl ConfigValidator for ReportConfig {
    fn validate(&self) -> CropbatchResult<()> {
        ValidationUtils::validate_not_empty(&self.output_dir, "report.output_dir")
    }
}
