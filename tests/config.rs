use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use corrbench::config::{BenchmarkEntry, Config, ConfigLoader};
use corrbench::domain::{Benchmark, Split, SubClass, ThresholdPolicy};
use corrbench::error::CorrError;

#[test]
fn parse_mixed_entries() {
    let content = r#"{
        "schema_version": 1,
        "datapath": "/data/corr",
        "benchmarks": [
            "spair",
            {"name": "PFPascal", "thres": "bbox", "split": "val", "feature_size": 32, "sub_class": "cat"}
        ]
    }"#;
    let config: Config = serde_json::from_str(content).unwrap();
    assert_matches!(config.benchmarks[0], BenchmarkEntry::Shorthand(_));
    assert_matches!(config.benchmarks[1], BenchmarkEntry::Detailed(_));

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.datapath, Utf8PathBuf::from("/data/corr"));
    assert_eq!(resolved.benchmarks.len(), 2);

    let spair = &resolved.benchmarks[0];
    assert_eq!(spair.benchmark, Benchmark::Spair);
    assert_eq!(spair.thres, ThresholdPolicy::Auto);
    assert_eq!(spair.feature_size, 16);

    let pascal = &resolved.benchmarks[1];
    assert_eq!(pascal.benchmark, Benchmark::PfPascal);
    assert_eq!(pascal.thres, ThresholdPolicy::Bbox);
    assert_eq!(pascal.split, Split::Val);
    assert_eq!(pascal.feature_size, 32);
    assert_eq!(pascal.sub_class, SubClass::Named("cat".to_string()));

    let options = pascal.dataset_options(&resolved.datapath);
    assert_eq!(options.datapath, Utf8PathBuf::from("/data/corr"));
    assert_eq!(options.split, Split::Val);
    assert!(!options.augmentation);
}

#[test]
fn shorthand_and_detailed_resolve_alike() {
    let shorthand: Config = serde_json::from_str(r#"{"benchmarks": ["caltech"]}"#).unwrap();
    let detailed: Config =
        serde_json::from_str(r#"{"benchmarks": [{"name": "caltech"}]}"#).unwrap();

    let a = ConfigLoader::resolve_config(shorthand).unwrap();
    let b = ConfigLoader::resolve_config(detailed).unwrap();
    assert_eq!(a.benchmarks, b.benchmarks);
}

#[test]
fn unsupported_schema_version() {
    let config: Config = serde_json::from_str(r#"{"schema_version": 2}"#).unwrap();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, CorrError::Configuration(_));
}

#[test]
fn explicit_missing_file_is_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("missing.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, CorrError::ConfigRead(_));
}

#[test]
fn malformed_file_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("corrbench.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, CorrError::ConfigParse(_));
}

#[test]
fn reads_endpoint_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("corrbench.json");
    std::fs::write(
        &path,
        r#"{"endpoint": "http://127.0.0.1:8080/uc", "benchmarks": ["pfwillow"]}"#,
    )
    .unwrap();
    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.endpoint, "http://127.0.0.1:8080/uc");
    assert_eq!(resolved.benchmarks[0].benchmark, Benchmark::PfWillow);
}
