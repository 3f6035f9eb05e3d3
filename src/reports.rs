use cropbatch_config::SimulationConfig;
use cropbatch_infrastructure::{ColumnSource, ReportColumn, ReportSpec};

/// The standard report family written per completed job: one daily
/// whole-profile file and one per-layer soil file. Column order, units and
/// codes follow the established exchange layout of these trials; absent
/// series render as `na`.
pub fn default_report_specs(
    simulation: &SimulationConfig,
    with_model_code: bool,
) -> Vec<ReportSpec> {
    // Jobs of a variant fan-out are distinguished by their model code;
    // otherwise the sequential env id keeps file names unique.
    let job_tag = if with_model_code {
        "{model_code}"
    } else {
        "{env_id}"
    };
    let layer_thickness_cm = (simulation.layer_thickness_m * 100.0).round() as u32;

    let daily = ReportSpec::new(&format!("{job_tag}Daily{{treatment_id}}.txt"))
        .with_title_line("cropbatch daily output")
        .with_column(ReportColumn::new("framework_ID", "text", "FRAMEWORK_ID", ColumnSource::Literal("MO".into())))
        .with_column(ReportColumn::new("model_ID", "text", "MODEL_ID", model_column(with_model_code)))
        .with_column(ReportColumn::new("treatment_ID", "text", "TREAT_ID", ColumnSource::Tag("treatment_id".into())))
        .with_column(ReportColumn::new("date", "(YYYY-MM-DD)", "DATE", ColumnSource::Scalar("Date".into())))
        .with_column(ReportColumn::new("tops_dry_weight", "kg[DM]/ha", "CWAD", ColumnSource::Scalar("CWAD".into())))
        .with_column(ReportColumn::new("grain_dry_weight", "kg[DM]/ha", "GWAD", ColumnSource::Scalar("GWAD".into())))
        .with_column(ReportColumn::new("tops_N", "kg[N]/ha", "CNAD", ColumnSource::Scalar("CNAD".into())))
        .with_column(ReportColumn::new("grain_N", "kg[N]/ha", "GNAD", ColumnSource::Scalar("GNAD".into())))
        .with_column(ReportColumn::new("root_depth", "m", "RDPD", ColumnSource::Scalar("RDPD".into())))
        .with_column(ReportColumn::new("soil_water_whole_profile", "cm3/cm3", "SWWPD", ColumnSource::Scalar("SWWPD".into())))
        .with_column(ReportColumn::new("drainage_daily", "mm/d", "DRND", ColumnSource::Scalar("DRND".into())))
        .with_column(ReportColumn::new("runoff_surface", "mm/d", "ROFD", ColumnSource::Scalar("ROFD".into())))
        .with_column(ReportColumn::new("N_leached_day", "kg[N]/ha/d", "NLCD", ColumnSource::Scalar("NLCD".into())))
        .with_column(ReportColumn::new("soil_temp_surface_daily_avg", "°C", "TSSAV", ColumnSource::Scalar("TSSAV".into())))
        .with_column(ReportColumn::new("evapotranspiration_daily", "mm/d", "ETAD", ColumnSource::Scalar("ETAD".into())))
        .with_column(ReportColumn::new("transpiration_daily", "mm/d", "EPAD", ColumnSource::Scalar("EPAD".into())));

    let layers = ReportSpec::new(&format!("{job_tag}Layers{{treatment_id}}.txt"))
        .with_title_line("cropbatch per-layer output")
        .with_per_layer(simulation.number_of_layers, layer_thickness_cm)
        .with_column(ReportColumn::new("framework_ID", "text", "FRAMEWORK_ID", ColumnSource::Literal("MO".into())))
        .with_column(ReportColumn::new("model_ID", "text", "MODEL_ID", model_column(with_model_code)))
        .with_column(ReportColumn::new("treatment_ID", "text", "TREAT_ID", ColumnSource::Tag("treatment_id".into())))
        .with_column(ReportColumn::new("date", "(YYYY-MM-DD)", "DATE", ColumnSource::Scalar("Date".into())))
        .with_column(ReportColumn::new("soil_layer_top_depth", "cm", "SLLT", ColumnSource::LayerTop))
        .with_column(ReportColumn::new("soil_layer_base_depth", "cm", "SLLB", ColumnSource::LayerBottom))
        .with_column(ReportColumn::new("soil_temp_daily_avg", "°C", "TSAV", ColumnSource::PerLayer("TSAV".into())))
        .with_column(ReportColumn::new("maximum_soil_temp_daily", "°C", "TSMX", ColumnSource::Literal("na".into())))
        .with_column(ReportColumn::new("minimum_soil_temp_daily", "°C", "TSMN", ColumnSource::Literal("na".into())))
        .with_column(ReportColumn::new("soil_water_by_layer", "cm3/cm3", "SWLD", ColumnSource::PerLayer("SWLD".into())))
        .with_column(ReportColumn::new("soil_N_by_layer", "kg[N]/ha", "SNLD", ColumnSource::PerLayer("SNLD".into())));

    vec![daily, layers]
}

fn model_column(with_model_code: bool) -> ColumnSource {
    if with_model_code {
        ColumnSource::Tag("model_code".into())
    } else {
        ColumnSource::Literal("MO".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropbatch_domain::entities::CustomId;
    use cropbatch_domain::messages::ResultBlock;
    use cropbatch_domain::ports::ReportSink;
    use cropbatch_infrastructure::DelimitedReportWriter;
    use serde_json::json;

    #[test]
    fn specs_resolve_against_builder_tags() {
        let simulation = SimulationConfig::default();
        let specs = default_report_specs(&simulation, true);
        assert_eq!(specs.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let writer = DelimitedReportWriter::new(dir.path(), specs).unwrap();
        let custom_id = CustomId::new()
            .with_tag("env_id", "1")
            .with_tag("treatment_id", "T2")
            .with_tag("model_code", "DS");
        let data = vec![ResultBlock {
            results: serde_json::from_value(json!([
                {"Date": "1993-03-10", "CNAD": 42.0, "TSAV": [11.0, 12.0]}
            ]))
            .unwrap(),
            orig_spec: None,
        }];

        let paths = writer.write_result(&custom_id, &data).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["DSDailyT2.txt", "DSLayersT2.txt"]);

        let layers = std::fs::read_to_string(&paths[1]).unwrap();
        // Header block plus one row per configured layer.
        assert_eq!(
            layers.lines().count(),
            4 + SimulationConfig::default().number_of_layers
        );
    }

    #[test]
    fn specs_without_variants_use_the_env_id() {
        let specs = default_report_specs(&SimulationConfig::default(), false);
        assert!(specs[0].file_name_pattern.starts_with("{env_id}"));
    }
}
