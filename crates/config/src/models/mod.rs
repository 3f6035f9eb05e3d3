mod app_config;
mod message_queue;
mod run;

pub use app_config::AppConfig;
pub use message_queue::{MessageQueueConfig, MessageQueueType};
pub use run::{CollectorConfig, ModelVariantConfig, ProducerConfig, ReportConfig, SimulationConfig};
