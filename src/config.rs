use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::dataset::DatasetOptions;
use crate::domain::{Benchmark, Split, SubClass, ThresholdPolicy};
use crate::drive::DEFAULT_ENDPOINT;
use crate::error::CorrError;
use crate::store::DEFAULT_DATAPATH;

pub const CONFIG_FILE: &str = "corrbench.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub datapath: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BenchmarkEntry {
    Shorthand(String),
    Detailed(BenchmarkEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BenchmarkEntryObject {
    pub name: String,
    #[serde(default)]
    pub thres: Option<ThresholdPolicy>,
    #[serde(default)]
    pub split: Option<Split>,
    #[serde(default)]
    pub feature_size: Option<u32>,
    #[serde(default)]
    pub sub_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRequest {
    pub benchmark: Benchmark,
    pub thres: ThresholdPolicy,
    pub split: Split,
    pub feature_size: u32,
    pub sub_class: SubClass,
}

impl BenchmarkRequest {
    /// Loader settings with the evaluation defaults.
    pub fn new(benchmark: Benchmark) -> Self {
        let defaults = DatasetOptions::default();
        Self {
            benchmark,
            thres: defaults.thres,
            split: defaults.split,
            feature_size: defaults.feature_size,
            sub_class: defaults.sub_class,
        }
    }

    pub fn dataset_options(&self, datapath: &Utf8PathBuf) -> DatasetOptions {
        DatasetOptions {
            datapath: datapath.clone(),
            thres: self.thres,
            split: self.split,
            feature_size: self.feature_size,
            sub_class: self.sub_class.clone(),
            ..DatasetOptions::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub datapath: Utf8PathBuf,
    pub endpoint: String,
    pub benchmarks: Vec<BenchmarkRequest>,
}

impl ResolvedConfig {
    /// Settings configured for `benchmark`, or the defaults when it is not listed.
    pub fn request_for(&self, benchmark: Benchmark) -> BenchmarkRequest {
        self.benchmarks
            .iter()
            .find(|request| request.benchmark == benchmark)
            .cloned()
            .unwrap_or_else(|| BenchmarkRequest::new(benchmark))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `corrbench.json` in the working directory when no
    /// path is given. Only an explicitly named file has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CorrError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {CONFIG_FILE} found; using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CorrError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CorrError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CorrError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(CorrError::Configuration(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let benchmarks = config
            .benchmarks
            .into_iter()
            .map(|entry| match entry {
                BenchmarkEntry::Shorthand(value) => {
                    Ok(BenchmarkRequest::new(value.parse()?))
                }
                BenchmarkEntry::Detailed(obj) => {
                    let mut request = BenchmarkRequest::new(obj.name.parse()?);
                    if let Some(thres) = obj.thres {
                        request.thres = thres;
                    }
                    if let Some(split) = obj.split {
                        request.split = split;
                    }
                    if let Some(feature_size) = obj.feature_size {
                        request.feature_size = feature_size;
                    }
                    if let Some(sub_class) = obj.sub_class.as_deref() {
                        request.sub_class = SubClass::from(sub_class);
                    }
                    Ok(request)
                }
            })
            .collect::<Result<Vec<_>, CorrError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            datapath: Utf8PathBuf::from(
                config
                    .datapath
                    .unwrap_or_else(|| DEFAULT_DATAPATH.to_string()),
            ),
            endpoint: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            benchmarks,
        })
    }
}
