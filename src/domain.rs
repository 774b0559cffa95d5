use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CorrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Benchmark {
    PfPascal,
    PfWillow,
    Caltech,
    Spair,
    Cubs,
}

/// Static description of where a benchmark comes from and where it lands.
#[derive(Debug, PartialEq, Eq)]
pub struct BenchmarkSpec {
    pub name: &'static str,
    /// Share identifier on the drive; `None` when the archive has to be
    /// obtained out-of-band.
    pub remote_token: Option<&'static str>,
    pub canonical_dirname: &'static str,
}

static BENCHMARKS: [BenchmarkSpec; 5] = [
    BenchmarkSpec {
        name: "pfpascal",
        remote_token: Some("1OOwpGzJnTsFXYh-YffMQ9XKM_Kl_zdzg"),
        canonical_dirname: "PF-PASCAL",
    },
    BenchmarkSpec {
        name: "pfwillow",
        remote_token: Some("1tDP0y8RO5s45L-vqnortRaieiWENQco_"),
        canonical_dirname: "PF-WILLOW",
    },
    BenchmarkSpec {
        name: "caltech",
        remote_token: Some("1IV0E5sJ6xSdDyIvVSTdZjPHELMwGzsMn"),
        canonical_dirname: "Caltech-101",
    },
    BenchmarkSpec {
        name: "spair",
        remote_token: Some("1s73NVEFPro260H1tXxCh1ain7oApR8of"),
        canonical_dirname: "SPair-71k",
    },
    BenchmarkSpec {
        name: "cubs",
        remote_token: None,
        canonical_dirname: "CUB_200_2011",
    },
];

impl Benchmark {
    pub const ALL: [Benchmark; 5] = [
        Benchmark::PfPascal,
        Benchmark::PfWillow,
        Benchmark::Caltech,
        Benchmark::Spair,
        Benchmark::Cubs,
    ];

    pub fn spec(self) -> &'static BenchmarkSpec {
        match self {
            Benchmark::PfPascal => &BENCHMARKS[0],
            Benchmark::PfWillow => &BENCHMARKS[1],
            Benchmark::Caltech => &BENCHMARKS[2],
            Benchmark::Spair => &BENCHMARKS[3],
            Benchmark::Cubs => &BENCHMARKS[4],
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    pub fn canonical_dirname(self) -> &'static str {
        self.spec().canonical_dirname
    }

    pub fn remote_token(self) -> Option<&'static str> {
        self.spec().remote_token
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Benchmark {
    type Err = CorrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Benchmark::ALL
            .into_iter()
            .find(|benchmark| benchmark.as_str() == normalized)
            .ok_or_else(|| {
                CorrError::Configuration(format!(
                    "invalid benchmark dataset {value} (expected one of pfpascal, pfwillow, caltech, spair, cubs)"
                ))
            })
    }
}

/// How the PCK matching threshold is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdPolicy {
    #[default]
    Auto,
    Img,
    Bbox,
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdPolicy::Auto => write!(f, "auto"),
            ThresholdPolicy::Img => write!(f, "img"),
            ThresholdPolicy::Bbox => write!(f, "bbox"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[serde(alias = "train")]
    #[value(alias = "train")]
    Trn,
    Val,
    #[default]
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Trn => write!(f, "trn"),
            Split::Val => write!(f, "val"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// Device the dataset tensors are expected to live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeTarget {
    #[default]
    Cpu,
    Cuda(u32),
}

impl fmt::Display for ComputeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeTarget::Cpu => write!(f, "cpu"),
            ComputeTarget::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for ComputeTarget {
    type Err = CorrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cpu" => Ok(ComputeTarget::Cpu),
            "cuda" => Ok(ComputeTarget::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(ComputeTarget::Cuda)
                .ok_or_else(|| {
                    CorrError::Configuration(format!("invalid compute target: {value}"))
                }),
        }
    }
}

/// Category filter; `all` keeps every category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubClass {
    #[default]
    All,
    Named(String),
}

impl SubClass {
    pub fn matches(&self, category: &str) -> bool {
        match self {
            SubClass::All => true,
            SubClass::Named(name) => name == category,
        }
    }
}

impl fmt::Display for SubClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubClass::All => write!(f, "all"),
            SubClass::Named(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for SubClass {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            SubClass::All
        } else {
            SubClass::Named(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_benchmark_valid() {
        let benchmark: Benchmark = " SPair ".parse().unwrap();
        assert_eq!(benchmark, Benchmark::Spair);
        assert_eq!(benchmark.canonical_dirname(), "SPair-71k");
    }

    #[test]
    fn parse_benchmark_invalid() {
        let err = "pascal-voc".parse::<Benchmark>().unwrap_err();
        assert_matches!(err, CorrError::Configuration(_));
    }

    #[test]
    fn table_lookup_matches_names() {
        for benchmark in Benchmark::ALL {
            assert_eq!(benchmark.as_str().parse::<Benchmark>().unwrap(), benchmark);
        }
        assert!(Benchmark::Cubs.remote_token().is_none());
        assert_eq!(
            Benchmark::PfWillow.remote_token(),
            Some("1tDP0y8RO5s45L-vqnortRaieiWENQco_")
        );
    }

    #[test]
    fn parse_compute_target() {
        assert_eq!("cpu".parse::<ComputeTarget>().unwrap(), ComputeTarget::Cpu);
        assert_eq!(
            "cuda".parse::<ComputeTarget>().unwrap(),
            ComputeTarget::Cuda(0)
        );
        assert_eq!(
            "CUDA:3".parse::<ComputeTarget>().unwrap(),
            ComputeTarget::Cuda(3)
        );
        assert_matches!(
            "tpu".parse::<ComputeTarget>(),
            Err(CorrError::Configuration(_))
        );
    }

    #[test]
    fn sub_class_all_matches_everything() {
        assert_eq!(SubClass::from("all"), SubClass::All);
        assert!(SubClass::All.matches("cat"));
        let named = SubClass::from("dog");
        assert!(named.matches("dog"));
        assert!(!named.matches("cat"));
    }
}
