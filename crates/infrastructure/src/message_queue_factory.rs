use std::sync::Arc;

use tracing::info;

use cropbatch_config::{MessageQueueConfig, MessageQueueType};
use cropbatch_domain::ports::MessageQueue;
use cropbatch_errors::CropbatchResult;

use crate::in_memory_queue::InMemoryMessageQueue;
use crate::message_queue::RabbitMqMessageQueue;

/// Creates the message queue implementation selected by configuration.
pub struct MessageQueueFactory;

impl MessageQueueFactory {
    pub async fn create(config: &MessageQueueConfig) -> CropbatchResult<Arc<dyn MessageQueue>> {
        match config.r#type {
            MessageQueueType::Rabbitmq => {
                info!("using RabbitMQ message queue at {}", config.url);
                let queue = RabbitMqMessageQueue::new(config.clone()).await?;
                Ok(Arc::new(queue))
            }
            MessageQueueType::InMemory => {
                info!("using in-memory message queue");
                Ok(Arc::new(InMemoryMessageQueue::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_in_memory_queue() {
        let config = MessageQueueConfig::in_memory_default();
        let queue = MessageQueueFactory::create(&config).await.unwrap();
        queue.create_queue("jobs", false).await.unwrap();
        assert_eq!(queue.queue_size("jobs").await.unwrap(), 0);
    }
}
