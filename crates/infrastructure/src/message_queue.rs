use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Queue,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use cropbatch_config::MessageQueueConfig;
use cropbatch_domain::ports::MessageQueue;
use cropbatch_errors::{CropbatchError, CropbatchResult};

/// How long a timed receive sleeps between empty polls of the broker.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// RabbitMQ message queue implementation.
pub struct RabbitMqMessageQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    config: MessageQueueConfig,
}

impl RabbitMqMessageQueue {
    pub async fn new(config: MessageQueueConfig) -> CropbatchResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| {
                CropbatchError::QueueUnavailable(format!("failed to connect to RabbitMQ: {e}"))
            })?;

        let channel = connection.create_channel().await.map_err(|e| {
            CropbatchError::QueueUnavailable(format!("failed to create channel: {e}"))
        })?;

        info!("connected to RabbitMQ at {}", config.url);

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            config,
        };
        queue.initialize_queues().await?;
        Ok(queue)
    }

    /// Declare the job and result queues up front so producer and consumer
    /// can start in either order.
    async fn initialize_queues(&self) -> CropbatchResult<()> {
        let channel = self.channel.lock().await;
        self.declare_queue(&channel, &self.config.job_queue, true)
            .await?;
        self.declare_queue(&channel, &self.config.result_queue, true)
            .await?;
        debug!("job and result queues declared");
        Ok(())
    }

    async fn declare_queue(
        &self,
        channel: &Channel,
        queue_name: &str,
        durable: bool,
    ) -> CropbatchResult<Queue> {
        let queue = channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                CropbatchError::QueueUnavailable(format!(
                    "failed to declare queue {queue_name}: {e}"
                ))
            })?;
        debug!("queue {} declared", queue_name);
        Ok(queue)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> CropbatchResult<()> {
        self.connection.close(200, "normal shutdown").await.map_err(|e| {
            CropbatchError::QueueUnavailable(format!("failed to close connection: {e}"))
        })?;
        info!("RabbitMQ connection closed");
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RabbitMqMessageQueue {
    async fn publish_message(&self, queue: &str, payload: &[u8]) -> CropbatchResult<()> {
        let channel = self.channel.lock().await;

        let confirm = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // 2 = persistent
            )
            .await
            .map_err(|e| {
                CropbatchError::QueueUnavailable(format!("failed to publish to {queue}: {e}"))
            })?;

        confirm.await.map_err(|e| {
            CropbatchError::QueueUnavailable(format!("publish confirmation failed: {e}"))
        })?;

        debug!("published {} bytes to queue {}", payload.len(), queue);
        Ok(())
    }

    async fn receive_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> CropbatchResult<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let channel = self.channel.lock().await;
                let get_result = channel
                    .basic_get(queue, BasicGetOptions::default())
                    .await
                    .map_err(|e| {
                        CropbatchError::QueueUnavailable(format!(
                            "failed to get message from {queue}: {e}"
                        ))
                    })?;

                if let Some(delivery) = get_result {
                    let payload = delivery.data.clone();
                    channel
                        .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
                        .await
                        .map_err(|e| {
                            CropbatchError::QueueUnavailable(format!("failed to ack message: {e}"))
                        })?;
                    debug!("received {} bytes from queue {}", payload.len(), queue);
                    return Ok(Some(payload));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIVE_POLL_INTERVAL.min(timeout)).await;
        }
    }

    async fn create_queue(&self, queue: &str, durable: bool) -> CropbatchResult<()> {
        let channel = self.channel.lock().await;
        self.declare_queue(&channel, queue, durable).await?;
        Ok(())
    }

    async fn queue_size(&self, queue: &str) -> CropbatchResult<u32> {
        let channel = self.channel.lock().await;
        let queue_info = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                CropbatchError::QueueUnavailable(format!("failed to inspect queue {queue}: {e}"))
            })?;
        Ok(queue_info.message_count())
    }

    async fn purge_queue(&self, queue: &str) -> CropbatchResult<()> {
        let channel = self.channel.lock().await;
        channel
            .queue_purge(queue, QueuePurgeOptions::default())
            .await
            .map_err(|e| {
                CropbatchError::QueueUnavailable(format!("failed to purge queue {queue}: {e}"))
            })?;
        debug!("queue {} purged", queue);
        Ok(())
    }
}
