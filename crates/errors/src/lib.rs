use thiserror::Error;


#[derive(Debug, Error)]
pub enum CropbatchError {
    #[error("malformed input record ({source_kind}): {reason}")]
    MalformedRecord { source_kind: String, reason: String },
    #[error("schedule insertion failed for treatment {treatment_id}: {reason}")]
    ScheduleInsertion {
        treatment_id: String,
        reason: String,
    },
    #[error("message queue unavailable: {0}")]
    QueueUnavailable(String),
    #[error("protocol violation in queue payload: {0}")]
    Protocol(String),
    #[error("receive timed out: {received} of {expected} expected results arrived")]
    Timeout { received: usize, expected: usize },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("report output error: {0}")]
    Report(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CropbatchResult<T> = Result<T, CropbatchError>;

impl CropbatchError {
    pub fn malformed_record<K: Into<String>, R: Into<String>>(source_kind: K, reason: R) -> Self {
        Self::MalformedRecord {
            source_kind: source_kind.into(),
            reason: reason.into(),
        }
    }
    pub fn schedule_insertion<T: Into<String>, R: Into<String>>(treatment_id: T, reason: R) -> Self {
        Self::ScheduleInsertion {
            treatment_id: treatment_id.into(),
            reason: reason.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// Fatal errors abort the whole run; everything else is recovered
    /// per record or per message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CropbatchError::QueueUnavailable(_)
                | CropbatchError::Timeout { .. }
                | CropbatchError::Configuration(_)
                | CropbatchError::Internal(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(self, CropbatchError::Timeout { .. })
    }
}

impl From<serde_json::Error> for CropbatchError {
    fn from(err: serde_json::Error) -> Self {
        CropbatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CropbatchError {
    fn from(err: anyhow::Error) -> Self {
        CropbatchError::Internal(err.to_string())
    }
}
