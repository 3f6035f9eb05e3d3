use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use cropbatch_collector::Collector;
use cropbatch_config::AppConfig;
use cropbatch_dispatcher::{Dispatcher, JobBuilder, ModelVariant};
use cropbatch_domain::entities::SimulationParameters;
use cropbatch_domain::ports::MessageQueue;
use cropbatch_domain::records::TrialSetup;
use cropbatch_errors::CropbatchError;
use cropbatch_infrastructure::{DelimitedReportWriter, MessageQueueFactory};

use crate::reports;

/// Application run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Build the batch and dispatch it to the job queue.
    Producer,
    /// Collect results from the result queue and write reports.
    Consumer,
    /// Dispatch, then collect, against the same broker. The worker pool is
    /// external either way.
    All,
}

pub struct Application {
    config: AppConfig,
    mode: AppMode,
    message_queue: Arc<dyn MessageQueue>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("initializing application, mode: {:?}", mode);
        let message_queue = MessageQueueFactory::create(&config.message_queue)
            .await
            .context("failed to create message queue")?;
        Ok(Self {
            config,
            mode,
            message_queue,
        })
    }

    pub async fn run(&self) -> Result<()> {
        match self.mode {
            AppMode::Producer => {
                self.run_producer().await?;
            }
            AppMode::Consumer => {
                self.run_consumer().await?;
            }
            AppMode::All => {
                self.run_producer().await?;
                self.run_consumer().await?;
            }
        }
        Ok(())
    }

    /// Load the trial, build the batch and stream it to the job queue,
    /// ending with the sentinel.
    async fn run_producer(&self) -> Result<u32> {
        let trial = self.load_trial()?;
        info!(
            trial = %trial.trial_name,
            treatments = trial.treatments.len(),
            "trial loaded"
        );

        let parameters = SimulationParameters {
            layer_thickness_m: self.config.simulation.layer_thickness_m,
            number_of_layers: self.config.simulation.number_of_layers,
            ..Default::default()
        };
        let variants: Vec<ModelVariant> = self
            .config
            .producer
            .model_variants
            .iter()
            .map(|v| ModelVariant {
                name: v.name.clone(),
                code: v.code.clone(),
            })
            .collect();

        let mut builder = JobBuilder::new(parameters, variants);
        let (batch, job_errors) = builder.build_batch(&trial);
        for e in &job_errors {
            warn!(error = %e, "left out of the batch");
        }
        if batch.is_empty() {
            anyhow::bail!("no jobs could be built from trial '{}'", trial.trial_name);
        }

        let mut dispatcher = Dispatcher::new(
            self.message_queue.clone(),
            self.config.message_queue.job_queue.clone(),
            self.config.collector.sentinel_protocol,
        );
        let sent = dispatcher.dispatch_batch(&batch).await?;
        info!(jobs = sent, skipped = job_errors.len(), "batch dispatched");
        Ok(sent)
    }

    /// Run the collector to a terminal state and surface incomplete batches
    /// as a failure.
    async fn run_consumer(&self) -> Result<()> {
        let with_model_code = !self.config.producer.model_variants.is_empty();
        let specs = reports::default_report_specs(&self.config.simulation, with_model_code);
        let writer = Arc::new(
            DelimitedReportWriter::new(&self.config.report.output_dir, specs)
                .context("failed to prepare report output directory")?,
        );

        let collector = Collector::new(
            self.message_queue.clone(),
            self.config.message_queue.result_queue.clone(),
            self.config.collector.sentinel_protocol,
            Duration::from_millis(self.config.collector.receive_timeout_ms),
            writer,
        );

        let outcome = collector.run().await?;
        if outcome.is_complete() {
            info!(
                received = outcome.received,
                reports = outcome.reports.len(),
                protocol_errors = outcome.protocol_errors,
                worker_errors = outcome.worker_errors,
                "collection complete"
            );
            Ok(())
        } else {
            error!(
                received = outcome.received,
                expected = outcome.expected.unwrap_or(0),
                "batch incomplete"
            );
            Err(CropbatchError::Timeout {
                received: outcome.received,
                expected: outcome.expected.unwrap_or(0),
            }
            .into())
        }
    }

    fn load_trial(&self) -> Result<TrialSetup> {
        let path = &self.config.producer.trial_file;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read trial file {path}"))?;
        let trial: TrialSetup = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse trial file {path}"))?;
        Ok(trial)
    }
}
