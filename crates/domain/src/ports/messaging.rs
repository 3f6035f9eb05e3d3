use std::time::Duration;

use async_trait::async_trait;
use cropbatch_errors::CropbatchResult;

/// Interface for the two unidirectional queues between producer and
/// consumer. Payloads are opaque bytes; envelope encoding lives with the
/// domain types so a malformed message can be rejected per message instead
/// of poisoning the transport.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish one payload, preserving send order. A transport failure is
    /// fatal for the run.
    async fn publish_message(&self, queue: &str, payload: &[u8]) -> CropbatchResult<()>;

    /// Blocking receive with a per-call timeout; `Ok(None)` on timeout.
    async fn receive_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> CropbatchResult<Option<Vec<u8>>>;

    async fn create_queue(&self, queue: &str, durable: bool) -> CropbatchResult<()>;
    async fn queue_size(&self, queue: &str) -> CropbatchResult<u32>;
    async fn purge_queue(&self, queue: &str) -> CropbatchResult<()>;
}
