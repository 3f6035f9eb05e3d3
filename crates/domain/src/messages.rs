use std::collections::BTreeMap;

use cropbatch_errors::{CropbatchError, CropbatchResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::entities::{ClimateData, CustomId, Job, SimulationParameters, SoilProfile};
use crate::schedule::Schedule;

/// Outbound queue payload: one self-contained simulation run request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub custom_id: CustomId,
    pub parameters: SimulationParameters,
    pub schedule: Schedule,
    pub soil_profile: SoilProfile,
    pub climate: ClimateData,
}

impl JobEnvelope {
    pub fn from_job(job: &Job) -> Self {
        Self {
            custom_id: job.custom_id.clone(),
            parameters: job.parameters.clone(),
            schedule: job.schedule.clone(),
            soil_profile: job.soil_profile.clone(),
            climate: job.climate.clone(),
        }
    }
    pub fn to_bytes(&self) -> CropbatchResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }
}

/// Per-time-step value mapping inside a result block. Values are scalars or
/// per-layer arrays depending on the output variable.
pub type TimeStepValues = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBlock {
    #[serde(default)]
    pub results: Vec<TimeStepValues>,
    #[serde(default, rename = "origSpec", skip_serializing_if = "Option::is_none")]
    pub orig_spec: Option<String>,
}

/// Inbound queue payload: the worker's result for one job, demultiplexed by
/// the echoed customId.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub custom_id: CustomId,
    #[serde(default)]
    pub data: Vec<ResultBlock>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ResultEnvelope {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The two sentinel conventions observed on this queue protocol. They are
/// deliberately kept distinct and selected per run by configuration, never
/// guessed from message shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SentinelProtocol {
    /// Final message carries `customId.no_of_sent_envs` with the total
    /// count of prior messages.
    #[default]
    Counted,
    /// Final message is a bare `{"type": "finish"}` marker; the total is
    /// whatever arrived before it.
    FinishMarker,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Counted sentinel announcing the batch size.
    ExpectedTotal(usize),
    /// Finish marker; no further results will arrive.
    Finish,
    Result(ResultEnvelope),
}

impl SentinelProtocol {
    pub const COUNT_FIELD: &'static str = "no_of_sent_envs";

    pub fn encode_sentinel(&self, total: usize) -> serde_json::Value {
        match self {
            Self::Counted => json!({ "customId": { "no_of_sent_envs": total } }),
            Self::FinishMarker => json!({ "type": "finish" }),
        }
    }

    /// Classify one raw inbound payload. Anything that is neither this
    /// protocol's sentinel nor a demultiplexable result is a protocol
    /// violation scoped to that single message.
    pub fn classify(&self, payload: &[u8]) -> CropbatchResult<InboundMessage> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| CropbatchError::Protocol(format!("payload is not valid JSON: {e}")))?;

        match self {
            Self::Counted => {
                if let Some(total) = value
                    .get("customId")
                    .and_then(|c| c.get(Self::COUNT_FIELD))
                    .and_then(|v| v.as_u64())
                {
                    return Ok(InboundMessage::ExpectedTotal(total as usize));
                }
            }
            Self::FinishMarker => {
                if value.get("type").and_then(|v| v.as_str()) == Some("finish") {
                    return Ok(InboundMessage::Finish);
                }
            }
        }

        let envelope: ResultEnvelope = serde_json::from_value(value)
            .map_err(|e| CropbatchError::Protocol(format!("result payload not decodable: {e}")))?;
        if envelope.custom_id.is_empty() {
            return Err(CropbatchError::Protocol(
                "result payload carries an empty customId".to_string(),
            ));
        }
        Ok(InboundMessage::Result(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_sentinel_roundtrip() {
        let protocol = SentinelProtocol::Counted;
        let bytes = serde_json::to_vec(&protocol.encode_sentinel(7)).unwrap();
        assert_eq!(
            protocol.classify(&bytes).unwrap(),
            InboundMessage::ExpectedTotal(7)
        );
    }

    #[test]
    fn finish_marker_roundtrip() {
        let protocol = SentinelProtocol::FinishMarker;
        let bytes = serde_json::to_vec(&protocol.encode_sentinel(0)).unwrap();
        assert_eq!(protocol.classify(&bytes).unwrap(), InboundMessage::Finish);
    }

    #[test]
    fn counted_sentinel_is_not_recognized_under_finish_marker() {
        // The conventions are distinct contracts; a counted sentinel under
        // the finish-marker protocol is just a malformed result.
        let bytes = serde_json::to_vec(&SentinelProtocol::Counted.encode_sentinel(7)).unwrap();
        match SentinelProtocol::FinishMarker.classify(&bytes) {
            Ok(InboundMessage::Result(envelope)) => {
                assert_eq!(envelope.custom_id.get("no_of_sent_envs"), Some("7"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn result_payload_classifies_with_defaults() {
        let raw = br#"{"customId": {"treatment_id": "T2", "env_id": 1}, "data": [{"results": [{"CNAD": 1.5}]}]}"#;
        match SentinelProtocol::Counted.classify(raw).unwrap() {
            InboundMessage::Result(envelope) => {
                assert_eq!(envelope.custom_id.get("treatment_id"), Some("T2"));
                assert_eq!(envelope.data.len(), 1);
                assert!(envelope.errors.is_empty());
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn garbage_payload_is_a_protocol_error() {
        let result = SentinelProtocol::Counted.classify(b"not json at all");
        assert!(matches!(result, Err(CropbatchError::Protocol(_))));
    }

    #[test]
    fn missing_custom_id_is_a_protocol_error() {
        let result = SentinelProtocol::Counted.classify(br#"{"data": []}"#);
        assert!(matches!(result, Err(CropbatchError::Protocol(_))));
    }
}
