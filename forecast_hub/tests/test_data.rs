mod common;

use common::{date, Hub, HEADER};
use forecast_hub::config::{Exclusion, PipelineConfig};
use forecast_hub::data::{parse_file_name, parse_iso_date, HubReader, SourceFile};
use forecast_hub::{HubError, SkipCategory};
use rstest::rstest;

fn source(model: &str) -> SourceFile {
    SourceFile {
        model_id: model.to_string(),
        reference_date: date("2024-01-13"),
        origin: "test.csv".to_string(),
    }
}

#[rstest]
#[case("2024-01-13-modelA.csv", Some(("2024-01-13", "modelA")))]
#[case("2023-10-14-UNC_IDD-influpaint.csv", Some(("2023-10-14", "UNC_IDD-influpaint")))]
#[case("2024-01-13-.csv", None)]
#[case("2024-13-01-modelA.csv", None)]
#[case("2024-01-13-modelA.parquet", None)]
#[case("modelA.csv", None)]
fn test_parse_file_name(#[case] name: &str, #[case] expected: Option<(&str, &str)>) {
    let parsed = parse_file_name(name);
    let expected = expected.map(|(d, m)| (date(d), m.to_string()));
    assert_eq!(parsed, expected);
}

#[test]
fn test_parse_iso_date() {
    assert_eq!(parse_iso_date("2024-01-13"), Some(date("2024-01-13")));
    assert_eq!(parse_iso_date("2024-01-13 00:00:00"), Some(date("2024-01-13")));
    assert_eq!(parse_iso_date("13/01/2024"), None);
}

#[test]
fn test_read_csv_filters_and_resolves() {
    let registry = common::registry();
    let config = PipelineConfig::flusight();
    let reader = HubReader::new(&registry, &config);

    let csv = format!(
        "{}\n\
         2024-01-13,wk inc flu hosp,0,2024-01-13,37,quantile,0.5,100\n\
         2024-01-13,wk inc flu hosp,1,2024-01-20,NC,quantile,0.5,110\n\
         2024-01-13,wk inc flu hosp,0,2024-01-13,99,quantile,0.5,1\n\
         2024-01-13,peak week inc flu hosp,0,2024-01-13,37,pmf,2024-01-20,0.2\n\
         2024-01-13,wk inc flu hosp,x,2024-01-13,37,quantile,0.5,100\n\
         2024-01-13,wk inc flu hosp,2,2024-01-27,37,quantile,0.5,NA\n",
        HEADER
    );
    let batch = reader.read_csv(csv.as_bytes(), source("modelA")).unwrap();

    assert_eq!(batch.records.len(), 2);
    assert!(batch.records.iter().all(|r| r.location == "37"));
    assert_eq!(batch.records[1].horizon, 1);
    assert_eq!(batch.records[1].value, 110.0);

    // Unknown location and the two malformed rows are counted; the
    // out-of-scope target is not an error.
    assert_eq!(batch.skipped.get(SkipCategory::Lookup), 1);
    assert_eq!(batch.skipped.get(SkipCategory::Parse), 2);
    assert_eq!(batch.skipped.total(), 3);
}

#[test]
fn test_read_csv_rsv_columns() {
    let registry = common::registry();
    let config = PipelineConfig::rsv();
    let reader = HubReader::new(&registry, &config);

    // origin_date instead of reference_date, no target_end_date, age groups
    let csv = "origin_date,target,horizon,location,age_group,output_type,output_type_id,value\n\
               2024-01-13,inc hosp,0,37,0-130,quantile,0.5,40\n\
               2024-01-13,inc hosp,2,37,0-130,quantile,0.5,55\n\
               2024-01-13,inc hosp,0,37,65-130,quantile,0.5,20\n";
    let batch = reader.read_csv(csv.as_bytes(), source("rsv-model")).unwrap();

    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].reference_date, date("2024-01-13"));
    assert_eq!(batch.records[0].target_end_date, date("2024-01-13"));
    assert_eq!(batch.records[1].target_end_date, date("2024-01-27"));
    assert!(batch.skipped.is_empty());
}

#[test]
fn test_read_csv_reference_and_origin_date() {
    let registry = common::registry();
    let config = PipelineConfig::flusight();
    let reader = HubReader::new(&registry, &config);

    let csv = "reference_date,origin_date,target,horizon,target_end_date,location,output_type,output_type_id,value\n\
               2024-01-20,2024-01-17,wk inc flu hosp,0,2024-01-20,37,quantile,0.5,10\n\
               ,2024-01-17,wk inc flu hosp,1,2024-01-24,37,quantile,0.5,12\n";
    let batch = reader.read_csv(csv.as_bytes(), source("modelA")).unwrap();

    assert!(batch.skipped.is_empty());
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].reference_date, date("2024-01-20"));
    assert_eq!(batch.records[1].reference_date, date("2024-01-17"));
}

#[test]
fn test_read_csv_missing_columns() {
    let registry = common::registry();
    let config = PipelineConfig::flusight();
    let reader = HubReader::new(&registry, &config);

    let csv = "reference_date,location,value\n2024-01-13,37,1\n";
    let result = reader.read_csv(csv.as_bytes(), source("modelA"));
    match result {
        Err(HubError::ParseError(msg)) => {
            assert!(msg.contains("target"));
            assert!(msg.contains("output_type"));
        }
        other => panic!("expected a parse error, got {:?}", other.map(|b| b.records.len())),
    }
}

#[test]
fn test_exclusions_come_from_config() {
    let registry = common::registry();
    let mut config = PipelineConfig::flusight();
    config.exclusions.push(Exclusion {
        model: "modelA".to_string(),
        location: "37".to_string(),
    });
    let reader = HubReader::new(&registry, &config);

    let csv = format!(
        "{}\n\
         2024-01-13,wk inc flu hosp,0,2024-01-13,37,quantile,0.5,100\n\
         2024-01-13,wk inc flu hosp,0,2024-01-13,06,quantile,0.5,300\n",
        HEADER
    );

    let excluded = reader.read_csv(csv.as_bytes(), source("modelA")).unwrap();
    assert_eq!(excluded.records.len(), 1);
    assert_eq!(excluded.records[0].location, "06");
    assert_eq!(excluded.skipped.get(SkipCategory::Excluded), 1);

    // Other models are unaffected
    let kept = reader.read_csv(csv.as_bytes(), source("modelB")).unwrap();
    assert_eq!(kept.records.len(), 2);
}

#[test]
fn test_discover() {
    let hub = Hub::new();
    hub.add_model_file("modelA", "2024-01-13", &[]);
    hub.add_model_file("modelA", "2024-01-06", &[]);
    hub.add_model_file("FluSight-ensemble", "2024-01-13", &[]);
    hub.write("model-output/modelA/2024-01-13-modelB.csv", HEADER);
    hub.write("model-output/modelA/notes.txt", "not a forecast");
    hub.write("model-output/modelA/2024-01-20-modelA.parquet", "");

    let registry = common::registry();
    let config = PipelineConfig::flusight();
    let reader = HubReader::new(&registry, &config);

    let (files, skipped) = reader
        .discover(&hub.path().join("model-output"), false)
        .unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|f| format!("{}/{}", f.source.model_id, f.source.reference_date))
        .collect();
    assert_eq!(
        names,
        vec![
            "FluSight-ensemble/2024-01-13",
            "modelA/2024-01-06",
            "modelA/2024-01-13",
        ]
    );
    // Mismatched model suffix and the parquet file
    assert_eq!(skipped.get(SkipCategory::Parse), 2);

    // Demo mode keeps only the configured demo models
    let (demo, _) = reader
        .discover(&hub.path().join("model-output"), true)
        .unwrap();
    assert_eq!(demo.len(), 1);
    assert_eq!(demo[0].source.model_id, "FluSight-ensemble");
}

#[test]
fn test_discover_missing_directory() {
    let registry = common::registry();
    let config = PipelineConfig::flusight();
    let reader = HubReader::new(&registry, &config);

    let result = reader.discover(std::path::Path::new("/nonexistent/model-output"), false);
    assert!(matches!(result, Err(HubError::ConfigError(_))));
}
