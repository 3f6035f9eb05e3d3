use std::sync::Arc;

use tracing::{debug, info};

use cropbatch_domain::entities::{Job, JobBatch};
use cropbatch_domain::messages::{JobEnvelope, SentinelProtocol};
use cropbatch_domain::ports::MessageQueue;
use cropbatch_errors::{CropbatchError, CropbatchResult};

/// Dispatch lifecycle. The sentinel can only ever be the last message, so a
/// closed dispatcher refuses further sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Sending(u32),
    Finished(u32),
}

/// Streams job payloads to the outbound queue in order, then announces the
/// final count with one sentinel message.
pub struct Dispatcher {
    message_queue: Arc<dyn MessageQueue>,
    job_queue: String,
    protocol: SentinelProtocol,
    state: DispatcherState,
}

impl Dispatcher {
    pub fn new(
        message_queue: Arc<dyn MessageQueue>,
        job_queue: String,
        protocol: SentinelProtocol,
    ) -> Self {
        Self {
            message_queue,
            job_queue,
            protocol,
            state: DispatcherState::Idle,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn sent_count(&self) -> u32 {
        match self.state {
            DispatcherState::Idle => 0,
            DispatcherState::Sending(n) | DispatcherState::Finished(n) => n,
        }
    }

    /// Serialize and publish one job. A transport failure aborts the run;
    /// there is no partial-batch retry.
    pub async fn send(&mut self, job: &Job) -> CropbatchResult<()> {
        if let DispatcherState::Finished(_) = self.state {
            return Err(CropbatchError::Protocol(
                "dispatcher already sent its sentinel, no further jobs may follow".to_string(),
            ));
        }

        let payload = JobEnvelope::from_job(job).to_bytes()?;
        self.message_queue
            .publish_message(&self.job_queue, &payload)
            .await?;

        let sent = self.sent_count() + 1;
        self.state = DispatcherState::Sending(sent);
        debug!(
            job_id = job.id,
            custom_id = %job.custom_id.tag_string(),
            sent,
            "job dispatched"
        );
        Ok(())
    }

    /// Publish the sentinel as the final message and finish. Delivered
    /// exactly once; closing twice is a protocol violation.
    pub async fn close(&mut self) -> CropbatchResult<u32> {
        let sent = match self.state {
            DispatcherState::Finished(_) => {
                return Err(CropbatchError::Protocol(
                    "dispatcher already closed".to_string(),
                ))
            }
            DispatcherState::Idle => 0,
            DispatcherState::Sending(n) => n,
        };

        let sentinel = serde_json::to_vec(&self.protocol.encode_sentinel(sent as usize))?;
        self.message_queue
            .publish_message(&self.job_queue, &sentinel)
            .await?;

        self.state = DispatcherState::Finished(sent);
        info!(jobs = sent, "batch dispatched, sentinel sent");
        Ok(sent)
    }

    /// Send every job of a batch in order, then close.
    pub async fn dispatch_batch(&mut self, batch: &JobBatch) -> CropbatchResult<u32> {
        for job in batch.jobs() {
            self.send(job).await?;
        }
        self.close().await
    }
}
