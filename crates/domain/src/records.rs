use std::collections::BTreeMap;

use chrono::NaiveDate;
use cropbatch_errors::{CropbatchError, CropbatchResult};
use serde::{Deserialize, Serialize};

use crate::entities::{
    ApplicationMethod, ClimateData, EventKind, ManagementEvent, SoilLayer,
};

/// Typed input records as yielded by the upstream data source. Field codes
/// follow the trial data's ICASA-style column names; parsing the sheets into
/// these records is outside this repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FertilizerRecord {
    #[serde(rename = "EID")]
    pub experiment_id: Option<String>,
    #[serde(rename = "TREAT_ID")]
    pub treatment_id: Option<String>,
    #[serde(rename = "FEDATE")]
    pub date: Option<String>,
    #[serde(rename = "FEACD")]
    pub application_code: Option<String>,
    #[serde(rename = "FEDEP")]
    pub depth_cm: Option<f64>,
    #[serde(rename = "FECD")]
    pub product_code: Option<String>,
    #[serde(rename = "FEAMN")]
    pub amount: Option<f64>,
    #[serde(rename = "FENO3")]
    pub no3_amount: Option<f64>,
    #[serde(rename = "FENH4")]
    pub nh4_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrrigationRecord {
    #[serde(rename = "EID")]
    pub experiment_id: Option<String>,
    #[serde(rename = "TREAT_ID")]
    pub treatment_id: Option<String>,
    #[serde(rename = "IDATE")]
    pub date: Option<String>,
    #[serde(rename = "IROP")]
    pub operation_code: Option<String>,
    #[serde(rename = "IRADP")]
    pub depth_cm: Option<f64>,
    #[serde(rename = "IRVAL")]
    pub volume_mm: Option<f64>,
    #[serde(rename = "IRNPC")]
    pub nitrogen_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlantingRecord {
    #[serde(rename = "EID")]
    pub experiment_id: Option<String>,
    #[serde(rename = "TREAT_ID")]
    pub treatment_id: Option<String>,
    #[serde(rename = "PDATE")]
    pub date: Option<String>,
    #[serde(rename = "CUL_ID")]
    pub cultivar_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestRecord {
    #[serde(rename = "EID")]
    pub experiment_id: Option<String>,
    #[serde(rename = "TREAT_ID")]
    pub treatment_id: Option<String>,
    #[serde(rename = "HADAT")]
    pub date: Option<String>,
}

/// One treatment of a trial: the anchors, the unordered event records, and
/// references into the shared soil/climate tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentSetup {
    pub treatment_id: String,
    pub experiment_id: String,
    pub soil_id: String,
    pub climate_id: String,
    pub crop: String,
    pub planting: PlantingRecord,
    pub harvest: HarvestRecord,
    #[serde(default)]
    pub fertilizer_events: Vec<FertilizerRecord>,
    #[serde(default)]
    pub irrigation_events: Vec<IrrigationRecord>,
    /// Per-treatment sensitivity values passed through to the model.
    #[serde(default)]
    pub custom_data: BTreeMap<String, f64>,
}

/// A whole trial as handed over by the data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialSetup {
    pub trial_name: String,
    #[serde(default)]
    pub treatments: Vec<TreatmentSetup>,
    #[serde(default)]
    pub soil_profiles: BTreeMap<String, Vec<SoilLayer>>,
    #[serde(default)]
    pub climate: BTreeMap<String, ClimateData>,
}

/// Dates arrive as ISO strings, sometimes with a trailing time component;
/// only the first ten characters are significant.
fn parse_record_date(source_kind: &str, raw: Option<&str>) -> CropbatchResult<NaiveDate> {
    let raw = raw.ok_or_else(|| CropbatchError::malformed_record(source_kind, "date missing"))?;
    let trimmed = raw.get(..10).unwrap_or(raw);
    trimmed.parse().map_err(|_| {
        CropbatchError::malformed_record(source_kind, format!("unparseable date '{raw}'"))
    })
}

fn require_id<'a>(
    source_kind: &str,
    field: &str,
    value: Option<&'a String>,
) -> CropbatchResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.as_str()),
        _ => Err(CropbatchError::malformed_record(
            source_kind,
            format!("{field} missing"),
        )),
    }
}

/// Absent or NaN numeric fields default to 0.0; only structurally required
/// fields are fatal for a record.
fn numeric_or_default(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Converts heterogeneous input records into the common event representation.
/// Pure mapping; a failed record is reported, never panicked over.
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn normalize_fertilizer(record: &FertilizerRecord) -> CropbatchResult<ManagementEvent> {
        const KIND: &str = "fertilizer";
        require_id(KIND, "TREAT_ID", record.treatment_id.as_ref())?;
        require_id(KIND, "EID", record.experiment_id.as_ref())?;
        let date = parse_record_date(KIND, record.date.as_deref())?;
        Ok(ManagementEvent {
            date,
            kind: EventKind::Fertilization {
                amount: numeric_or_default(record.amount),
                method: ApplicationMethod::from_code(
                    record.application_code.as_deref().unwrap_or(""),
                ),
                depth_cm: numeric_or_default(record.depth_cm),
                product_code: record.product_code.clone().unwrap_or_default(),
                no3_amount: numeric_or_default(record.no3_amount),
                nh4_amount: numeric_or_default(record.nh4_amount),
            },
        })
    }

    pub fn normalize_irrigation(record: &IrrigationRecord) -> CropbatchResult<ManagementEvent> {
        const KIND: &str = "irrigation";
        require_id(KIND, "TREAT_ID", record.treatment_id.as_ref())?;
        require_id(KIND, "EID", record.experiment_id.as_ref())?;
        let date = parse_record_date(KIND, record.date.as_deref())?;
        Ok(ManagementEvent {
            date,
            kind: EventKind::Irrigation {
                volume_mm: numeric_or_default(record.volume_mm),
                depth_cm: numeric_or_default(record.depth_cm),
                nitrogen_pct: numeric_or_default(record.nitrogen_pct),
                operation_code: record.operation_code.clone().unwrap_or_default(),
            },
        })
    }

    pub fn normalize_planting(record: &PlantingRecord) -> CropbatchResult<NaiveDate> {
        parse_record_date("planting", record.date.as_deref())
    }

    pub fn normalize_harvest(record: &HarvestRecord) -> CropbatchResult<NaiveDate> {
        parse_record_date("harvest", record.date.as_deref())
    }
}
