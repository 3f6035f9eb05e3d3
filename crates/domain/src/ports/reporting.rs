use std::path::PathBuf;

use cropbatch_errors::CropbatchResult;

use crate::entities::CustomId;
use crate::messages::ResultBlock;

/// Where completed results go, one call per result, in arrival order. The
/// collector hands every result over immediately; nothing is buffered for
/// the whole batch.
pub trait ReportSink: Send + Sync {
    /// Write the report file(s) for one completed job and return their
    /// paths.
    fn write_result(
        &self,
        custom_id: &CustomId,
        data: &[ResultBlock],
    ) -> CropbatchResult<Vec<PathBuf>>;
}
