use tracing::{debug, warn};

use cropbatch_domain::entities::{
    ClimateData, CustomId, Job, JobBatch, ManagementEvent, SimulationParameters, SoilProfile,
};
use cropbatch_domain::records::{EventNormalizer, TreatmentSetup, TrialSetup};
use cropbatch_domain::schedule::{Schedule, ScheduleAssembler};
use cropbatch_errors::{CropbatchError, CropbatchResult};

/// One soil-temperature model variant a treatment is fanned out over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVariant {
    pub name: String,
    pub code: String,
}

/// Builds self-contained jobs from a trial setup: one job per
/// (treatment, model variant) pair, with 1-based sequential ids.
///
/// Every job is constructed from cloned values; building a job never touches
/// a previously built one. This replaces the one-template-mutated-in-place
/// style the batch runs started out with, which risked cross-job
/// contamination.
pub struct JobBuilder {
    assembler: ScheduleAssembler,
    base_parameters: SimulationParameters,
    model_variants: Vec<ModelVariant>,
    next_id: u32,
}

impl JobBuilder {
    pub fn new(base_parameters: SimulationParameters, model_variants: Vec<ModelVariant>) -> Self {
        Self {
            assembler: ScheduleAssembler::new(base_parameters.layer_thickness_m),
            base_parameters,
            model_variants,
            next_id: 1,
        }
    }

    /// Build the whole batch. Malformed records are skipped and schedule
    /// failures lose that treatment's jobs; both are returned alongside the
    /// batch so the operator sees what was left out.
    pub fn build_batch(&mut self, trial: &TrialSetup) -> (JobBatch, Vec<CropbatchError>) {
        let mut batch = JobBatch::new();
        let mut job_errors = Vec::new();

        for treatment in &trial.treatments {
            match self.build_treatment_jobs(trial, treatment, &mut job_errors) {
                Ok(jobs) => {
                    for job in jobs {
                        batch.push(job);
                    }
                }
                Err(e) => {
                    warn!(
                        treatment_id = %treatment.treatment_id,
                        error = %e,
                        "treatment skipped"
                    );
                    job_errors.push(e);
                }
            }
        }

        (batch, job_errors)
    }

    fn build_treatment_jobs(
        &mut self,
        trial: &TrialSetup,
        treatment: &TreatmentSetup,
        record_errors: &mut Vec<CropbatchError>,
    ) -> CropbatchResult<Vec<Job>> {
        let soil_profile = self.lookup_soil(trial, treatment)?;
        let climate = self.lookup_climate(trial, treatment)?;
        let events = self.normalize_events(treatment, record_errors);

        let sowing_date = EventNormalizer::normalize_planting(&treatment.planting)?;
        let harvest_date = EventNormalizer::normalize_harvest(&treatment.harvest)?;
        let schedule = self.assembler.assemble(
            &treatment.treatment_id,
            &treatment.crop,
            sowing_date,
            harvest_date,
            &events,
        )?;

        let mut parameters = self.base_parameters.clone();
        parameters.custom_data = treatment.custom_data.clone();

        let mut jobs = Vec::new();
        if self.model_variants.is_empty() {
            jobs.push(self.build_job(
                trial,
                treatment,
                None,
                schedule.clone(),
                soil_profile.clone(),
                climate.clone(),
                parameters.clone(),
            ));
        } else {
            // One job per model variant, each from its own clones.
            let variants = self.model_variants.clone();
            for variant in &variants {
                jobs.push(self.build_job(
                    trial,
                    treatment,
                    Some(variant),
                    schedule.clone(),
                    soil_profile.clone(),
                    climate.clone(),
                    parameters.clone(),
                ));
            }
        }
        Ok(jobs)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_job(
        &mut self,
        trial: &TrialSetup,
        treatment: &TreatmentSetup,
        variant: Option<&ModelVariant>,
        schedule: Schedule,
        soil_profile: SoilProfile,
        climate: ClimateData,
        mut parameters: SimulationParameters,
    ) -> Job {
        let id = self.next_id;
        self.next_id += 1;

        let mut custom_id = CustomId::new()
            .with_tag("env_id", id.to_string())
            .with_tag("trial", trial.trial_name.clone())
            .with_tag("experiment_id", treatment.experiment_id.clone())
            .with_tag("treatment_id", treatment.treatment_id.clone())
            .with_tag("soil_id", treatment.soil_id.clone())
            .with_tag("climate_id", treatment.climate_id.clone());

        if let Some(variant) = variant {
            parameters.soil_temperature_model = Some(variant.name.clone());
            custom_id.insert("st_model", variant.name.clone());
            custom_id.insert("model_code", variant.code.clone());
        }

        debug!(job_id = id, custom_id = %custom_id.tag_string(), "job built");
        Job {
            id,
            custom_id,
            schedule,
            soil_profile,
            climate,
            parameters,
        }
    }

    fn lookup_soil(
        &self,
        trial: &TrialSetup,
        treatment: &TreatmentSetup,
    ) -> CropbatchResult<SoilProfile> {
        trial
            .soil_profiles
            .get(&treatment.soil_id)
            .map(|layers| SoilProfile::new(layers.clone()))
            .ok_or_else(|| {
                CropbatchError::malformed_record(
                    "treatment",
                    format!(
                        "soil profile '{}' referenced by treatment {} is unknown",
                        treatment.soil_id, treatment.treatment_id
                    ),
                )
            })
    }

    fn lookup_climate(
        &self,
        trial: &TrialSetup,
        treatment: &TreatmentSetup,
    ) -> CropbatchResult<ClimateData> {
        trial
            .climate
            .get(&treatment.climate_id)
            .cloned()
            .ok_or_else(|| {
                CropbatchError::malformed_record(
                    "treatment",
                    format!(
                        "climate dataset '{}' referenced by treatment {} is unknown",
                        treatment.climate_id, treatment.treatment_id
                    ),
                )
            })
    }

    /// Normalize the treatment's event records, skipping the malformed ones.
    fn normalize_events(
        &self,
        treatment: &TreatmentSetup,
        record_errors: &mut Vec<CropbatchError>,
    ) -> Vec<ManagementEvent> {
        let mut events = Vec::new();
        for record in &treatment.fertilizer_events {
            match EventNormalizer::normalize_fertilizer(record) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        treatment_id = %treatment.treatment_id,
                        error = %e,
                        "fertilizer record skipped"
                    );
                    record_errors.push(e);
                }
            }
        }
        for record in &treatment.irrigation_events {
            match EventNormalizer::normalize_irrigation(record) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        treatment_id = %treatment.treatment_id,
                        error = %e,
                        "irrigation record skipped"
                    );
                    record_errors.push(e);
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropbatch_domain::records::{
        FertilizerRecord, HarvestRecord, IrrigationRecord, PlantingRecord,
    };
    use std::collections::BTreeMap;

    fn trial() -> TrialSetup {
        let layer = cropbatch_domain::entities::SoilLayer {
            thickness_m: 0.1,
            organic_carbon_pct: 0.6,
            bulk_density_kg_m3: 1350.0,
            field_capacity: 0.29,
            pore_volume: 0.45,
            permanent_wilting_point: 0.13,
            clay_pct: 22.0,
            sand_pct: 40.0,
            silt_pct: 38.0,
            ph: 7.9,
            c_n: 10.0,
            moisture_pct_fc: None,
        };
        let mut soil_profiles = BTreeMap::new();
        soil_profiles.insert("CLLO".to_string(), vec![layer.clone(), layer]);
        let mut climate = BTreeMap::new();
        climate.insert("MARI9301".to_string(), ClimateData::default());

        TrialSetup {
            trial_name: "maricopa".to_string(),
            treatments: vec![treatment("T1"), treatment("T2")],
            soil_profiles,
            climate,
        }
    }

    fn treatment(id: &str) -> TreatmentSetup {
        TreatmentSetup {
            treatment_id: id.to_string(),
            experiment_id: "WHFACE".to_string(),
            soil_id: "CLLO".to_string(),
            climate_id: "MARI9301".to_string(),
            crop: "wheat".to_string(),
            planting: PlantingRecord {
                date: Some("1992-12-15".to_string()),
                ..Default::default()
            },
            harvest: HarvestRecord {
                date: Some("1993-05-25".to_string()),
                ..Default::default()
            },
            fertilizer_events: Vec::new(),
            irrigation_events: Vec::new(),
            custom_data: BTreeMap::new(),
        }
    }

    fn variants() -> Vec<ModelVariant> {
        vec![
            ModelVariant {
                name: "Monica_SoilTemp".to_string(),
                code: "MO".to_string(),
            },
            ModelVariant {
                name: "DSSAT_ST_standalone".to_string(),
                code: "DS".to_string(),
            },
        ]
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let mut builder = JobBuilder::new(SimulationParameters::default(), variants());
        let (batch, errors) = builder.build_batch(&trial());
        assert!(errors.is_empty());
        // 2 treatments x 2 variants.
        assert_eq!(batch.len(), 4);
        let ids: Vec<u32> = batch.jobs().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn custom_id_carries_variant_and_treatment() {
        let mut builder = JobBuilder::new(SimulationParameters::default(), variants());
        let (batch, _) = builder.build_batch(&trial());
        let job = &batch.jobs()[1];
        assert_eq!(job.custom_id.get("treatment_id"), Some("T1"));
        assert_eq!(job.custom_id.get("model_code"), Some("DS"));
        assert_eq!(
            job.parameters.soil_temperature_model.as_deref(),
            Some("DSSAT_ST_standalone")
        );
    }

    #[test]
    fn no_variants_means_one_job_per_treatment() {
        let mut builder = JobBuilder::new(SimulationParameters::default(), Vec::new());
        let (batch, errors) = builder.build_batch(&trial());
        assert!(errors.is_empty());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.jobs()[0].custom_id.get("model_code"), None);
    }

    #[test]
    fn jobs_are_value_independent() {
        let mut builder = JobBuilder::new(SimulationParameters::default(), variants());
        let (batch, _) = builder.build_batch(&trial());
        let mut jobs = batch.into_jobs();
        let schedule_before = jobs[0].schedule.clone();

        // Mutating one job leaves its siblings untouched.
        jobs[1].parameters.custom_data.insert("AWC".to_string(), 0.5);
        jobs[1].soil_profile.layers.clear();
        assert_eq!(jobs[0].schedule, schedule_before);
        assert!(!jobs[0].soil_profile.layers.is_empty());
        assert!(jobs[0].parameters.custom_data.is_empty());
    }

    #[test]
    fn malformed_record_is_skipped_but_treatment_survives() {
        let mut trial = trial();
        trial.treatments[0].fertilizer_events.push(FertilizerRecord {
            // Date missing: fatal for the record only.
            experiment_id: Some("WHFACE".to_string()),
            treatment_id: Some("T1".to_string()),
            ..Default::default()
        });
        let mut builder = JobBuilder::new(SimulationParameters::default(), Vec::new());
        let (batch, errors) = builder.build_batch(&trial);
        assert_eq!(batch.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CropbatchError::MalformedRecord { .. }));
    }

    #[test]
    fn schedule_failure_loses_the_treatment_not_the_batch() {
        let mut trial = trial();
        // Pending water marker paired with a zero-volume irrigation.
        trial.treatments[0].fertilizer_events.push(FertilizerRecord {
            experiment_id: Some("WHFACE".to_string()),
            treatment_id: Some("T1".to_string()),
            date: Some("1993-03-10".to_string()),
            application_code: Some("Applied in irrigation water".to_string()),
            amount: Some(120.0),
            ..Default::default()
        });
        trial.treatments[0].irrigation_events.push(IrrigationRecord {
            experiment_id: Some("WHFACE".to_string()),
            treatment_id: Some("T1".to_string()),
            date: Some("1993-03-10".to_string()),
            volume_mm: Some(0.0),
            ..Default::default()
        });

        let mut builder = JobBuilder::new(SimulationParameters::default(), Vec::new());
        let (batch, errors) = builder.build_batch(&trial);
        // T1 lost, T2 survives.
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.jobs()[0].custom_id.get("treatment_id"), Some("T2"));
        assert!(errors
            .iter()
            .any(|e| matches!(e, CropbatchError::ScheduleInsertion { .. })));
    }

    #[test]
    fn unknown_soil_reference_loses_the_treatment() {
        let mut trial = trial();
        trial.treatments[1].soil_id = "NOPE".to_string();
        let mut builder = JobBuilder::new(SimulationParameters::default(), Vec::new());
        let (batch, errors) = builder.build_batch(&trial);
        assert_eq!(batch.len(), 1);
        assert_eq!(errors.len(), 1);
    }
}
