//! End-to-end pipeline run against the in-memory queue: the shipped sample
//! trial is built into jobs, dispatched, "executed" by a stand-in worker
//! pool and collected into report files.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cropbatch_collector::{Collector, CollectorState};
use cropbatch_config::SimulationConfig;
use cropbatch_dispatcher::{Dispatcher, JobBuilder, ModelVariant};
use cropbatch_domain::entities::SimulationParameters;
use cropbatch_domain::messages::{InboundMessage, SentinelProtocol};
use cropbatch_domain::ports::MessageQueue;
use cropbatch_domain::records::TrialSetup;
use cropbatch_infrastructure::{DelimitedReportWriter, InMemoryMessageQueue};

const JOB_QUEUE: &str = "cropbatch.jobs";
const RESULT_QUEUE: &str = "cropbatch.results";
const TIMEOUT: Duration = Duration::from_millis(200);

fn load_sample_trial() -> TrialSetup {
    let raw = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/data/trial.json"))
        .expect("sample trial file should ship with the repo");
    serde_json::from_str(&raw).expect("sample trial file should parse")
}

/// Stand-in for the external worker pool: answers every job with a minimal
/// result echoing the customId, and forwards the sentinel.
async fn run_fake_workers(queue: Arc<InMemoryMessageQueue>) -> usize {
    let mut processed = 0;
    loop {
        let payload = queue
            .receive_message(JOB_QUEUE, TIMEOUT)
            .await
            .unwrap()
            .expect("job queue should not run dry before the sentinel");
        match SentinelProtocol::Counted.classify(&payload).unwrap() {
            InboundMessage::ExpectedTotal(total) => {
                assert_eq!(processed, total, "sentinel count matches dispatched jobs");
                queue
                    .publish_message(
                        RESULT_QUEUE,
                        &serde_json::to_vec(&SentinelProtocol::Counted.encode_sentinel(total))
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                return processed;
            }
            InboundMessage::Result(envelope) => {
                // The job payload decodes as a "result" shape because both
                // sides share the customId field; that is all the fake
                // worker needs.
                let result = serde_json::to_vec(&json!({
                    "customId": serde_json::to_value(&envelope.custom_id).unwrap(),
                    "data": [{"results": [
                        {"Date": "1993-03-10", "CNAD": 40.2, "TSAV": [11.0, 12.0]},
                        {"Date": "1993-03-11", "CNAD": 41.0, "TSAV": [11.4, 12.2]}
                    ]}]
                }))
                .unwrap();
                queue.publish_message(RESULT_QUEUE, &result).await.unwrap();
                processed += 1;
            }
            InboundMessage::Finish => unreachable!("counted protocol"),
        }
    }
}

#[tokio::test]
async fn sample_trial_flows_from_records_to_reports() {
    let trial = load_sample_trial();
    assert_eq!(trial.treatments.len(), 2);

    let simulation = SimulationConfig {
        layer_thickness_m: 0.05,
        number_of_layers: 2,
    };
    let parameters = SimulationParameters {
        layer_thickness_m: simulation.layer_thickness_m,
        number_of_layers: simulation.number_of_layers,
        ..Default::default()
    };
    let variants = vec![
        ModelVariant {
            name: "Monica_SoilTemp".to_string(),
            code: "MO".to_string(),
        },
        ModelVariant {
            name: "DSSAT_ST_standalone".to_string(),
            code: "DS".to_string(),
        },
    ];

    let mut builder = JobBuilder::new(parameters, variants);
    let (batch, errors) = builder.build_batch(&trial);
    assert!(errors.is_empty(), "sample trial should build cleanly: {errors:?}");
    // 2 treatments x 2 variants.
    assert_eq!(batch.len(), 4);

    let queue = Arc::new(InMemoryMessageQueue::new());
    let mut dispatcher =
        Dispatcher::new(queue.clone(), JOB_QUEUE.to_string(), SentinelProtocol::Counted);
    let sent = dispatcher.dispatch_batch(&batch).await.unwrap();
    assert_eq!(sent, 4);

    let processed = run_fake_workers(queue.clone()).await;
    assert_eq!(processed, 4);

    let dir = tempfile::tempdir().unwrap();
    let writer = Arc::new(
        DelimitedReportWriter::new(
            dir.path(),
            cropbatch::reports::default_report_specs(&simulation, true),
        )
        .unwrap(),
    );
    let collector = Collector::new(
        queue,
        RESULT_QUEUE.to_string(),
        SentinelProtocol::Counted,
        TIMEOUT,
        writer,
    );
    let outcome = collector.run().await.unwrap();

    assert_eq!(outcome.state, CollectorState::Done);
    assert_eq!(outcome.received, 4);
    // Two report files per job.
    assert_eq!(outcome.reports.len(), 8);

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert!(names.contains(&"MODailyT1.txt".to_string()));
    assert!(names.contains(&"DSLayersT2.txt".to_string()));

    // Each layered file: title line + 3 column rows, then 2 time steps x
    // 2 layers of data rows.
    let layered = std::fs::read_to_string(dir.path().join("MOLayersT1.txt")).unwrap();
    assert_eq!(layered.lines().count(), 4 + 4);
}
