use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::schedule::Schedule;

/// Descriptive tags identifying one job (location, soil, treatment, model
/// variant, ...). Echoed back verbatim by the worker pool and used as the
/// join key, so equality is exact equality of the full mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CustomId(BTreeMap<String, String>);

impl CustomId {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }
    pub fn with_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
    /// Tags joined for log lines and file names, in key order.
    pub fn tag_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// Workers echo the customId back as arbitrary JSON; scalar values arrive as
// strings, numbers or booleans depending on the producer. All of them are
// kept as their textual form so the join stays an exact string-map match.
impl<'de> Deserialize<'de> for CustomId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut tags = BTreeMap::new();
        for (key, value) in raw {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            tags.insert(key, text);
        }
        Ok(Self(tags))
    }
}

/// How a fertilizer application reaches the soil. The "applied in irrigation
/// water" code never becomes its own workstep; it rides along with the
/// same-date irrigation instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationMethod {
    Broadcast,
    Incorporated,
    InIrrigationWater,
    Other(String),
}

impl ApplicationMethod {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "Broadcast" | "AP001" => Self::Broadcast,
            "Incorporated" | "AP002" => Self::Incorporated,
            "Applied in irrigation water" | "AP005" => Self::InIrrigationWater,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One normalized management event. Immutable once produced; one input
/// record maps to exactly one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementEvent {
    pub date: NaiveDate,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Fertilization {
        /// kg N per ha.
        amount: f64,
        method: ApplicationMethod,
        depth_cm: f64,
        product_code: String,
        no3_amount: f64,
        nh4_amount: f64,
    },
    Irrigation {
        /// Applied water in mm.
        volume_mm: f64,
        /// Application depth below surface in cm.
        depth_cm: f64,
        nitrogen_pct: f64,
        operation_code: String,
    },
}

impl ManagementEvent {
    pub fn is_irrigation_water_marker(&self) -> bool {
        matches!(
            &self.kind,
            EventKind::Fertilization {
                method: ApplicationMethod::InIrrigationWater,
                ..
            }
        )
    }
}

/// Fertilizer nitrogen split used by the simulation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FertilizerPartition {
    pub carbamid: f64,
    #[serde(rename = "NH4")]
    pub nh4: f64,
    #[serde(rename = "NO3")]
    pub no3: f64,
    #[serde(rename = "name")]
    pub name: String,
}

impl FertilizerPartition {
    /// The collaborator's default split for mineral fertilizer products.
    pub fn carbamid_product(name: &str) -> Self {
        Self {
            carbamid: 100.0,
            nh4: 0.0,
            no3: 0.0,
            name: name.to_string(),
        }
    }
}

/// A dated management action in the simulation timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workstep {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub action: WorkstepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkstepAction {
    Sowing {
        crop: String,
    },
    Harvest,
    MineralFertilization {
        amount: f64,
        partition: FertilizerPartition,
    },
    Irrigation {
        amount: f64,
        #[serde(rename = "atLayer")]
        at_layer: usize,
        #[serde(rename = "nitrateConcentration", skip_serializing_if = "Option::is_none")]
        nitrate_concentration: Option<f64>,
    },
}

impl Workstep {
    pub fn sowing(date: NaiveDate, crop: &str) -> Self {
        Self {
            date,
            action: WorkstepAction::Sowing {
                crop: crop.to_string(),
            },
        }
    }
    pub fn harvest(date: NaiveDate) -> Self {
        Self {
            date,
            action: WorkstepAction::Harvest,
        }
    }
    pub fn is_sowing(&self) -> bool {
        matches!(self.action, WorkstepAction::Sowing { .. })
    }
    pub fn is_harvest(&self) -> bool {
        matches!(self.action, WorkstepAction::Harvest)
    }
}

/// One soil layer, ordered by increasing depth inside a profile. Field names
/// on the wire follow the simulation model's parameter names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilLayer {
    #[serde(rename = "Thickness")]
    pub thickness_m: f64,
    #[serde(rename = "SoilOrganicCarbon")]
    pub organic_carbon_pct: f64,
    #[serde(rename = "SoilBulkDensity")]
    pub bulk_density_kg_m3: f64,
    #[serde(rename = "FieldCapacity")]
    pub field_capacity: f64,
    #[serde(rename = "PoreVolume")]
    pub pore_volume: f64,
    #[serde(rename = "PermanentWiltingPoint")]
    pub permanent_wilting_point: f64,
    #[serde(rename = "Clay")]
    pub clay_pct: f64,
    #[serde(rename = "Sand")]
    pub sand_pct: f64,
    #[serde(rename = "Silt", default)]
    pub silt_pct: f64,
    #[serde(rename = "pH", default)]
    pub ph: f64,
    #[serde(rename = "CN", default)]
    pub c_n: f64,
    /// Initial moisture as percent of field capacity, merged in from the
    /// trial's initial-condition layers when present.
    #[serde(
        rename = "SoilMoisturePercentFC",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub moisture_pct_fc: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoilProfile {
    pub layers: Vec<SoilLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albedo: Option<f64>,
}

impl SoilProfile {
    pub fn new(layers: Vec<SoilLayer>) -> Self {
        Self {
            layers,
            albedo: None,
        }
    }
    pub fn total_depth_m(&self) -> f64 {
        self.layers.iter().map(|l| l.thickness_m).sum()
    }
    /// Depth bracket (top, bottom) of layer `index` in cm.
    pub fn layer_bounds_cm(&self, index: usize) -> Option<(u32, u32)> {
        if index >= self.layers.len() {
            return None;
        }
        let mut top = 0.0;
        for layer in &self.layers[..index] {
            top += layer.thickness_m * 100.0;
        }
        let bottom = top + self.layers[index].thickness_m * 100.0;
        Some((top.round() as u32, bottom.round() as u32))
    }
}

/// Daily weather variables keyed by the collaborator's fixed variable-code
/// enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub enum ClimateVariable {
    Tmin,
    Tavg,
    Tmax,
    Precip,
    GlobalRadiation,
    WindSpeed,
    RelativeHumidity,
    VaporPressure,
}

impl ClimateVariable {
    /// Numeric code on the collaborator's wire format.
    pub fn acd_code(&self) -> u8 {
        match self {
            Self::Tmin => 3,
            Self::Tavg => 4,
            Self::Tmax => 5,
            Self::Precip => 6,
            Self::GlobalRadiation => 8,
            Self::WindSpeed => 9,
            Self::RelativeHumidity => 12,
            Self::VaporPressure => 14,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateData {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Per-day series, one value per day of the date range.
    pub data: BTreeMap<ClimateVariable, Vec<f64>>,
    /// Annual average temperature at the site.
    #[serde(default)]
    pub tav: f64,
    /// Annual temperature amplitude at the site.
    #[serde(default)]
    pub tamp: f64,
}

impl ClimateData {
    pub fn series(&self, variable: ClimateVariable) -> Option<&[f64]> {
        self.data.get(&variable).map(Vec::as_slice)
    }
}

/// Simulation configuration shared by every job of a batch, plus per-job
/// overrides set by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    /// Discretization layer thickness in meters, also the divisor for
    /// irrigation depth-to-layer mapping.
    pub layer_thickness_m: f64,
    pub number_of_layers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_temperature_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atmospheric_co2: Option<f64>,
    /// Free-form per-job sensitivity values (plant-available water, LAI,
    /// mulch thickness, ...), passed through to the model untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_data: BTreeMap<String, f64>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            layer_thickness_m: 0.1,
            number_of_layers: 20,
            soil_temperature_model: None,
            latitude: None,
            elevation_m: None,
            slope: None,
            atmospheric_co2: None,
            custom_data: BTreeMap::new(),
        }
    }
}

/// One fully-specified simulation run request. Immutable after dispatch and
/// fully self-contained: no job references another job's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// 1-based sequential id assigned by the builder.
    pub id: u32,
    pub custom_id: CustomId,
    pub schedule: Schedule,
    pub soil_profile: SoilProfile,
    pub climate: ClimateData,
    pub parameters: SimulationParameters,
}

/// The ordered collection of all jobs for one run. Its cardinality is what
/// the trailing sentinel communicates to the collector.
#[derive(Debug, Clone, Default)]
pub struct JobBatch {
    jobs: Vec<Job>,
}

impl JobBatch {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }
    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }
    pub fn len(&self) -> usize {
        self.jobs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }
    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }
}
