pub mod models;
pub mod validation;

pub use models::{
    AppConfig, CollectorConfig, MessageQueueConfig, MessageQueueType, ModelVariantConfig,
    ProducerConfig, ReportConfig, SimulationConfig,
};
pub use validation::{ConfigValidator, ValidationUtils};
