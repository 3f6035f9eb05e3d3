use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use cropbatch_domain::entities::CustomId;
use cropbatch_domain::messages::ResultBlock;
use cropbatch_domain::ports::ReportSink;
use cropbatch_errors::{CropbatchError, CropbatchResult};

/// Where one report column takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSource {
    /// A customId tag, constant over the file.
    Tag(String),
    /// A per-time-step scalar result key.
    Scalar(String),
    /// A per-time-step array result key, indexed by the row's layer.
    PerLayer(String),
    /// Top depth of the row's layer in cm.
    LayerTop,
    /// Bottom depth of the row's layer in cm.
    LayerBottom,
    /// A fixed value, e.g. the framework id or a placeholder.
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportColumn {
    pub heading: String,
    pub unit: String,
    pub code: String,
    pub source: ColumnSource,
}

impl ReportColumn {
    pub fn new(heading: &str, unit: &str, code: &str, source: ColumnSource) -> Self {
        Self {
            heading: heading.to_string(),
            unit: unit.to_string(),
            code: code.to_string(),
            source,
        }
    }
}

/// Emit one row per (time step, layer) instead of one row per time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerLayerRows {
    pub layers: usize,
    pub layer_thickness_cm: u32,
}

/// Data-driven layout of one report file family member. The column order
/// and the three-line heading/unit/code block are emitted exactly as
/// configured.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    /// File name with `{tag}` placeholders resolved from the customId,
    /// e.g. `"{model_code}Daily{treatment_id}.txt"`.
    pub file_name_pattern: String,
    /// Free-form lines above the column block (trial name, model version).
    pub title_lines: Vec<String>,
    pub delimiter: String,
    /// Which result block of the envelope feeds the rows.
    pub block_index: usize,
    pub per_layer: Option<PerLayerRows>,
    pub columns: Vec<ReportColumn>,
}

impl ReportSpec {
    pub fn new(file_name_pattern: &str) -> Self {
        Self {
            file_name_pattern: file_name_pattern.to_string(),
            title_lines: Vec::new(),
            delimiter: "\t".to_string(),
            block_index: 0,
            per_layer: None,
            columns: Vec::new(),
        }
    }
    pub fn with_title_line(mut self, line: &str) -> Self {
        self.title_lines.push(line.to_string());
        self
    }
    pub fn with_block_index(mut self, index: usize) -> Self {
        self.block_index = index;
        self
    }
    pub fn with_per_layer(mut self, layers: usize, layer_thickness_cm: u32) -> Self {
        self.per_layer = Some(PerLayerRows {
            layers,
            layer_thickness_cm,
        });
        self
    }
    pub fn with_column(mut self, column: ReportColumn) -> Self {
        self.columns.push(column);
        self
    }

    fn resolve_file_name(&self, custom_id: &CustomId) -> CropbatchResult<String> {
        let mut name = String::new();
        let mut chars = self.file_name_pattern.chars();
        while let Some(c) = chars.next() {
            if c != '{' {
                name.push(c);
                continue;
            }
            let key: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match custom_id.get(&key) {
                Some(value) => name.push_str(value),
                None => {
                    return Err(CropbatchError::Report(format!(
                        "file name tag '{key}' missing from customId {{{}}}",
                        custom_id.tag_string()
                    )))
                }
            }
        }
        Ok(name)
    }
}

/// Absent, null and out-of-range values all render as the placeholder the
/// report format uses for missing data.
const MISSING: &str = "na";

fn render_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => MISSING.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Writes one delimited text file per report spec for every completed job.
pub struct DelimitedReportWriter {
    output_dir: PathBuf,
    specs: Vec<ReportSpec>,
}

impl DelimitedReportWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, specs: Vec<ReportSpec>) -> CropbatchResult<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir, specs })
    }

    fn write_spec(
        &self,
        spec: &ReportSpec,
        custom_id: &CustomId,
        data: &[ResultBlock],
    ) -> CropbatchResult<PathBuf> {
        let path = self.output_dir.join(spec.resolve_file_name(custom_id)?);
        let mut file = fs::File::create(&path)?;

        for line in &spec.title_lines {
            writeln!(file, "{line}")?;
        }
        for row in [
            spec.columns.iter().map(|c| c.heading.as_str()).collect::<Vec<_>>(),
            spec.columns.iter().map(|c| c.unit.as_str()).collect(),
            spec.columns.iter().map(|c| c.code.as_str()).collect(),
        ] {
            writeln!(file, "{}", row.join(&spec.delimiter))?;
        }

        let empty = ResultBlock::default();
        let block = data.get(spec.block_index).unwrap_or(&empty);
        for values in &block.results {
            match spec.per_layer {
                Some(per_layer) => {
                    for layer in 0..per_layer.layers {
                        let cells: Vec<String> = spec
                            .columns
                            .iter()
                            .map(|column| match &column.source {
                                ColumnSource::Tag(key) => {
                                    custom_id.get(key).unwrap_or(MISSING).to_string()
                                }
                                ColumnSource::Scalar(key) => render_value(values.get(key)),
                                ColumnSource::PerLayer(key) => render_value(
                                    values.get(key).and_then(|v| v.as_array()).and_then(|a| a.get(layer)),
                                ),
                                ColumnSource::LayerTop => {
                                    (layer as u32 * per_layer.layer_thickness_cm).to_string()
                                }
                                ColumnSource::LayerBottom => {
                                    ((layer as u32 + 1) * per_layer.layer_thickness_cm).to_string()
                                }
                                ColumnSource::Literal(text) => text.clone(),
                            })
                            .collect();
                        writeln!(file, "{}", cells.join(&spec.delimiter))?;
                    }
                }
                None => {
                    let cells: Vec<String> = spec
                        .columns
                        .iter()
                        .map(|column| match &column.source {
                            ColumnSource::Tag(key) => {
                                custom_id.get(key).unwrap_or(MISSING).to_string()
                            }
                            ColumnSource::Scalar(key) => render_value(values.get(key)),
                            // A per-layer source in a per-time-step report
                            // has no layer to index; render the placeholder.
                            ColumnSource::PerLayer(_) => MISSING.to_string(),
                            ColumnSource::LayerTop | ColumnSource::LayerBottom => {
                                MISSING.to_string()
                            }
                            ColumnSource::Literal(text) => text.clone(),
                        })
                        .collect();
                    writeln!(file, "{}", cells.join(&spec.delimiter))?;
                }
            }
        }

        debug!("report written to {}", path.display());
        Ok(path)
    }
}

impl ReportSink for DelimitedReportWriter {
    fn write_result(
        &self,
        custom_id: &CustomId,
        data: &[ResultBlock],
    ) -> CropbatchResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            paths.push(self.write_spec(spec, custom_id, data)?);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn custom_id() -> CustomId {
        CustomId::new()
            .with_tag("model_code", "DS")
            .with_tag("treatment_id", "T2")
    }

    fn daily_spec() -> ReportSpec {
        ReportSpec::new("{model_code}Daily{treatment_id}.txt")
            .with_title_line("Maricopa Wheat FACE")
            .with_column(ReportColumn::new("model_ID", "text", "MODEL_ID", ColumnSource::Tag("model_code".into())))
            .with_column(ReportColumn::new("date", "(YYYY-MM-DD)", "DATE", ColumnSource::Scalar("Date".into())))
            .with_column(ReportColumn::new("tops_N", "kg[N]/ha", "CNAD", ColumnSource::Scalar("CNAD".into())))
            .with_column(ReportColumn::new("leaf_number", "leaf/mainstem", "LNUM", ColumnSource::Literal("na".into())))
    }

    fn blocks(values: serde_json::Value) -> Vec<ResultBlock> {
        vec![ResultBlock {
            results: serde_json::from_value(values).unwrap(),
            orig_spec: None,
        }]
    }

    #[test]
    fn daily_report_layout_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DelimitedReportWriter::new(dir.path(), vec![daily_spec()]).unwrap();

        let data = blocks(json!([
            {"Date": "1993-03-10", "CNAD": 42.5},
            {"Date": "1993-03-11"}
        ]));
        let paths = writer.write_result(&custom_id(), &data).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].file_name().unwrap(), "DSDailyT2.txt");

        let content = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Maricopa Wheat FACE");
        assert_eq!(lines[1], "model_ID\tdate\ttops_N\tleaf_number");
        assert_eq!(lines[2], "text\t(YYYY-MM-DD)\tkg[N]/ha\tleaf/mainstem");
        assert_eq!(lines[3], "MODEL_ID\tDATE\tCNAD\tLNUM");
        assert_eq!(lines[4], "DS\t1993-03-10\t42.5\tna");
        // The second time step has no CNAD value.
        assert_eq!(lines[5], "DS\t1993-03-11\tna\tna");
    }

    #[test]
    fn per_layer_report_expands_rows() {
        let spec = ReportSpec::new("{model_code}Layers{treatment_id}.txt")
            .with_per_layer(3, 5)
            .with_column(ReportColumn::new("date", "(YYYY-MM-DD)", "DATE", ColumnSource::Scalar("Date".into())))
            .with_column(ReportColumn::new("top", "cm", "SLLT", ColumnSource::LayerTop))
            .with_column(ReportColumn::new("base", "cm", "SLLB", ColumnSource::LayerBottom))
            .with_column(ReportColumn::new("soil_temp", "°C", "TSAV", ColumnSource::PerLayer("TSAV".into())));

        let dir = tempfile::tempdir().unwrap();
        let writer = DelimitedReportWriter::new(dir.path(), vec![spec]).unwrap();
        let data = blocks(json!([
            {"Date": "1993-03-10", "TSAV": [11.0, 12.5]}
        ]));
        let paths = writer.write_result(&custom_id(), &data).unwrap();

        let content = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        // Three header rows, then one row per layer for the one time step.
        assert_eq!(lines.len(), 3 + 3);
        assert_eq!(lines[3], "1993-03-10\t0\t5\t11.0");
        assert_eq!(lines[4], "1993-03-10\t5\t10\t12.5");
        // The series only has two layers; the third renders as missing.
        assert_eq!(lines[5], "1993-03-10\t10\t15\tna");
    }

    #[test]
    fn missing_file_name_tag_is_a_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DelimitedReportWriter::new(dir.path(), vec![daily_spec()]).unwrap();
        let incomplete = CustomId::new().with_tag("treatment_id", "T2");
        let result = writer.write_result(&incomplete, &[]);
        assert!(matches!(result, Err(CropbatchError::Report(_))));
    }

    #[test]
    fn missing_block_yields_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DelimitedReportWriter::new(dir.path(), vec![daily_spec()]).unwrap();
        let paths = writer.write_result(&custom_id(), &[]).unwrap();
        let content = fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(content.lines().count(), 4);
    }
}
