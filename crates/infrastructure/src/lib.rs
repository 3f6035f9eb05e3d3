pub mod in_memory_queue;
pub mod message_queue;
pub mod message_queue_factory;
pub mod report;

pub use in_memory_queue::InMemoryMessageQueue;
pub use message_queue::RabbitMqMessageQueue;
pub use message_queue_factory::MessageQueueFactory;
pub use report::{ColumnSource, DelimitedReportWriter, ReportColumn, ReportSpec};
