use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use cropbatch_domain::entities::CustomId;
use cropbatch_domain::messages::{InboundMessage, SentinelProtocol};
use cropbatch_domain::ports::{MessageQueue, ReportSink};
use cropbatch_errors::CropbatchResult;

/// Collector lifecycle. `WaitingForCount` and `Draining` differ only in
/// whether the expected total is known yet; the sentinel may arrive before,
/// between or after the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    WaitingForCount,
    Draining,
    Done,
    TimedOut,
    Aborted,
}

/// What one collection run ended as. Reports written before a timeout are
/// retained; `received`/`expected` give the operator what a re-run needs.
#[derive(Debug)]
pub struct CollectorOutcome {
    pub state: CollectorState,
    pub received: usize,
    pub expected: Option<usize>,
    pub reports: Vec<PathBuf>,
    /// Messages dropped for missing demultiplexing fields.
    pub protocol_errors: usize,
    /// Results that carried worker-side error lists.
    pub worker_errors: usize,
}

impl CollectorOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == CollectorState::Done
    }
}

/// Pulls result payloads off the inbound queue, demultiplexes them by the
/// echoed customId, and hands each one to the report sink immediately. Runs
/// until every expected result is accounted for, or the receive window
/// elapses.
pub struct Collector {
    message_queue: Arc<dyn MessageQueue>,
    result_queue: String,
    protocol: SentinelProtocol,
    receive_timeout: Duration,
    sink: Arc<dyn ReportSink>,
}

impl Collector {
    pub fn new(
        message_queue: Arc<dyn MessageQueue>,
        result_queue: String,
        protocol: SentinelProtocol,
        receive_timeout: Duration,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            message_queue,
            result_queue,
            protocol,
            receive_timeout,
            sink,
        }
    }

    /// Run the receive loop to a terminal state. Transport failure is the
    /// only error path; an incomplete batch is a `TimedOut` outcome, not an
    /// error, so the counts always reach the operator.
    pub async fn run(&self) -> CropbatchResult<CollectorOutcome> {
        let mut state = CollectorState::WaitingForCount;
        let mut received: usize = 0;
        let mut expected: Option<usize> = None;
        let mut reports = Vec::new();
        let mut protocol_errors: usize = 0;
        let mut worker_errors: usize = 0;
        let mut seen: BTreeSet<CustomId> = BTreeSet::new();

        info!(
            queue = %self.result_queue,
            timeout_ms = self.receive_timeout.as_millis() as u64,
            "collector started"
        );

        loop {
            let payload = match self
                .message_queue
                .receive_message(&self.result_queue, self.receive_timeout)
                .await
            {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    warn!(
                        received,
                        expected = expected.unwrap_or(0),
                        timeout_ms = self.receive_timeout.as_millis() as u64,
                        "no message within the receive window, batch incomplete"
                    );
                    state = CollectorState::TimedOut;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "receive failed, aborting collection");
                    state = CollectorState::Aborted;
                    debug!(?state, "collector terminal state");
                    return Err(e);
                }
            };

            match self.protocol.classify(&payload) {
                Ok(InboundMessage::ExpectedTotal(total)) => {
                    if expected.replace(total).is_some() {
                        warn!(total, "duplicate sentinel received");
                    }
                    debug!(total, received, "batch size announced");
                }
                Ok(InboundMessage::Finish) => {
                    // No count was ever announced; whatever has arrived is
                    // the whole batch.
                    expected = Some(received);
                    debug!(received, "finish marker received");
                }
                Ok(InboundMessage::Result(envelope)) => {
                    received += 1;
                    debug!(
                        custom_id = %envelope.custom_id.tag_string(),
                        received,
                        "result received"
                    );

                    if envelope.has_errors() {
                        worker_errors += 1;
                        error!(
                            custom_id = %envelope.custom_id.tag_string(),
                            errors = ?envelope.errors,
                            "worker reported errors for this job"
                        );
                    }
                    if !seen.insert(envelope.custom_id.clone()) {
                        warn!(
                            custom_id = %envelope.custom_id.tag_string(),
                            "duplicate result for the same customId"
                        );
                    }

                    reports.extend(self.sink.write_result(&envelope.custom_id, &envelope.data)?);
                }
                Err(e) => {
                    // A single undecodable message is dropped; the rest of
                    // the batch is still expected.
                    protocol_errors += 1;
                    warn!(error = %e, "dropping undecodable result payload");
                }
            }

            match expected {
                Some(total) if received >= total => {
                    state = CollectorState::Done;
                    break;
                }
                Some(_) => state = CollectorState::Draining,
                None => state = CollectorState::WaitingForCount,
            }
        }

        if state == CollectorState::Done {
            info!(received, reports = reports.len(), "all expected results collected");
        }

        Ok(CollectorOutcome {
            state,
            received,
            expected,
            reports,
            protocol_errors,
            worker_errors,
        })
    }
}
