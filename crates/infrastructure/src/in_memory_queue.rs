use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use cropbatch_domain::ports::MessageQueue;
use cropbatch_errors::{CropbatchError, CropbatchResult};

/// In-memory message queue on tokio channels, for embedded single-process
/// runs and tests. Queues are created on first use; a batch is bounded by
/// its sentinel, so there is no eviction.
#[derive(Debug, Default)]
pub struct InMemoryMessageQueue {
    queues: RwLock<HashMap<String, QueueChannels>>,
}

#[derive(Debug)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    /// Receiver behind a mutex so the single logical consumer can await it.
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    size: Arc<AtomicU32>,
    _durable: bool,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        info!("creating in-memory message queue");
        Self::default()
    }

    async fn get_or_create_queue(&self, queue_name: &str, durable: bool) {
        let mut queues = self.queues.write().await;
        queues.entry(queue_name.to_string()).or_insert_with(|| {
            debug!("creating queue '{}'", queue_name);
            let (sender, receiver) = mpsc::unbounded_channel();
            QueueChannels {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
                size: Arc::new(AtomicU32::new(0)),
                _durable: durable,
            }
        });
    }

    async fn get_sender(&self, queue_name: &str) -> CropbatchResult<mpsc::UnboundedSender<Vec<u8>>> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|channels| channels.sender.clone())
            .ok_or_else(|| {
                CropbatchError::QueueUnavailable(format!("queue '{queue_name}' not found"))
            })
    }

    async fn get_receiver(
        &self,
        queue_name: &str,
    ) -> CropbatchResult<Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|channels| channels.receiver.clone())
            .ok_or_else(|| {
                CropbatchError::QueueUnavailable(format!("queue '{queue_name}' not found"))
            })
    }

    async fn size_counter(&self, queue_name: &str) -> Option<Arc<AtomicU32>> {
        self.queues
            .read()
            .await
            .get(queue_name)
            .map(|channels| channels.size.clone())
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(&self, queue: &str, payload: &[u8]) -> CropbatchResult<()> {
        self.get_or_create_queue(queue, false).await;
        let sender = self.get_sender(queue).await?;

        sender.send(payload.to_vec()).map_err(|e| {
            CropbatchError::QueueUnavailable(format!("failed to send to queue '{queue}': {e}"))
        })?;

        if let Some(size) = self.size_counter(queue).await {
            size.fetch_add(1, Ordering::Relaxed);
        }
        debug!("published {} bytes to queue '{}'", payload.len(), queue);
        Ok(())
    }

    async fn receive_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> CropbatchResult<Option<Vec<u8>>> {
        self.get_or_create_queue(queue, false).await;
        let receiver = self.get_receiver(queue).await?;

        let mut rx = receiver.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(payload)) => {
                if let Some(size) = self.size_counter(queue).await {
                    size.fetch_sub(1, Ordering::Relaxed);
                }
                debug!("received {} bytes from queue '{}'", payload.len(), queue);
                Ok(Some(payload))
            }
            Ok(None) => Err(CropbatchError::QueueUnavailable(format!(
                "queue '{queue}' closed"
            ))),
            Err(_) => Ok(None),
        }
    }

    async fn create_queue(&self, queue: &str, durable: bool) -> CropbatchResult<()> {
        self.get_or_create_queue(queue, durable).await;
        Ok(())
    }

    async fn queue_size(&self, queue: &str) -> CropbatchResult<u32> {
        self.size_counter(queue).await.map(|s| s.load(Ordering::Relaxed)).ok_or_else(
            || CropbatchError::QueueUnavailable(format!("queue '{queue}' not found")),
        )
    }

    async fn purge_queue(&self, queue: &str) -> CropbatchResult<()> {
        let receiver = self.get_receiver(queue).await?;
        let mut purged = 0u32;
        {
            let mut rx = receiver.lock().await;
            while rx.try_recv().is_ok() {
                purged += 1;
            }
        }
        if let Some(size) = self.size_counter(queue).await {
            size.store(0, Ordering::Relaxed);
        }
        if purged > 0 {
            warn!("purged {} messages from queue '{}'", purged, queue);
        }
        Ok(())
    }
}
