//! Benchmark → dataset constructor dispatch.
//!
//! Annotation parsing for each benchmark lives in [`DatasetLoader`]
//! implementations; this module only routes a request to the right one.

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{Benchmark, ComputeTarget, Split, SubClass, ThresholdPolicy};
use crate::error::CorrError;
use crate::store::DEFAULT_DATAPATH;

/// Uniform construction parameters shared by every benchmark loader.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOptions {
    pub datapath: Utf8PathBuf,
    pub thres: ThresholdPolicy,
    pub device: ComputeTarget,
    pub split: Split,
    pub augmentation: bool,
    pub feature_size: u32,
    pub sub_class: SubClass,
    /// Restrict to a single pair; `None` keeps all of them.
    pub item_index: Option<usize>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            datapath: Utf8PathBuf::from(DEFAULT_DATAPATH),
            thres: ThresholdPolicy::Auto,
            device: ComputeTarget::Cpu,
            split: Split::Test,
            augmentation: false,
            feature_size: 16,
            sub_class: SubClass::All,
            item_index: None,
        }
    }
}

impl DatasetOptions {
    pub fn new(datapath: impl Into<Utf8PathBuf>) -> Self {
        Self {
            datapath: datapath.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetRequest {
    PfPascal(DatasetOptions),
    PfWillow(DatasetOptions),
    Caltech(DatasetOptions),
    Spair(DatasetOptions),
    Cubs(DatasetOptions),
}

impl DatasetRequest {
    pub fn new(benchmark: Benchmark, options: DatasetOptions) -> Self {
        match benchmark {
            Benchmark::PfPascal => DatasetRequest::PfPascal(options),
            Benchmark::PfWillow => DatasetRequest::PfWillow(options),
            Benchmark::Caltech => DatasetRequest::Caltech(options),
            Benchmark::Spair => DatasetRequest::Spair(options),
            Benchmark::Cubs => DatasetRequest::Cubs(options),
        }
    }

    pub fn parse(name: &str, options: DatasetOptions) -> Result<Self, CorrError> {
        Ok(Self::new(name.parse()?, options))
    }

    pub fn benchmark(&self) -> Benchmark {
        match self {
            DatasetRequest::PfPascal(_) => Benchmark::PfPascal,
            DatasetRequest::PfWillow(_) => Benchmark::PfWillow,
            DatasetRequest::Caltech(_) => Benchmark::Caltech,
            DatasetRequest::Spair(_) => Benchmark::Spair,
            DatasetRequest::Cubs(_) => Benchmark::Cubs,
        }
    }

    pub fn options(&self) -> &DatasetOptions {
        match self {
            DatasetRequest::PfPascal(options)
            | DatasetRequest::PfWillow(options)
            | DatasetRequest::Caltech(options)
            | DatasetRequest::Spair(options)
            | DatasetRequest::Cubs(options) => options,
        }
    }

    /// `datapath/<canonical dirname>`, the directory a loader reads from.
    pub fn dataset_root(&self) -> Utf8PathBuf {
        self.options()
            .datapath
            .join(self.benchmark().canonical_dirname())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSample {
    pub pair_id: usize,
    pub category: String,
    pub src_image: Utf8PathBuf,
    pub trg_image: Utf8PathBuf,
    pub src_keypoints: Vec<[f32; 2]>,
    pub trg_keypoints: Vec<[f32; 2]>,
    /// Length the PCK `alpha` is multiplied with for this pair.
    pub pck_threshold: f32,
}

pub trait CorrespondenceDataset {
    fn benchmark(&self) -> Benchmark;
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Result<CorrespondenceSample, CorrError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One constructor per benchmark.
pub trait DatasetLoader {
    fn pf_pascal(
        &self,
        root: &Utf8Path,
        options: &DatasetOptions,
    ) -> Result<Box<dyn CorrespondenceDataset>, CorrError>;
    fn pf_willow(
        &self,
        root: &Utf8Path,
        options: &DatasetOptions,
    ) -> Result<Box<dyn CorrespondenceDataset>, CorrError>;
    fn caltech(
        &self,
        root: &Utf8Path,
        options: &DatasetOptions,
    ) -> Result<Box<dyn CorrespondenceDataset>, CorrError>;
    fn spair(
        &self,
        root: &Utf8Path,
        options: &DatasetOptions,
    ) -> Result<Box<dyn CorrespondenceDataset>, CorrError>;
    fn cubs(
        &self,
        root: &Utf8Path,
        options: &DatasetOptions,
    ) -> Result<Box<dyn CorrespondenceDataset>, CorrError>;
}

pub fn load_dataset<L: DatasetLoader + ?Sized>(
    loader: &L,
    request: &DatasetRequest,
) -> Result<Box<dyn CorrespondenceDataset>, CorrError> {
    let root = request.dataset_root();
    tracing::debug!(benchmark = %request.benchmark(), %root, "constructing dataset");
    match request {
        DatasetRequest::PfPascal(options) => loader.pf_pascal(&root, options),
        DatasetRequest::PfWillow(options) => loader.pf_willow(&root, options),
        DatasetRequest::Caltech(options) => loader.caltech(&root, options),
        DatasetRequest::Spair(options) => loader.spair(&root, options),
        DatasetRequest::Cubs(options) => loader.cubs(&root, options),
    }
}

/// Rejects unknown names before the loader is consulted.
pub fn load_dataset_by_name<L: DatasetLoader + ?Sized>(
    loader: &L,
    name: &str,
    options: DatasetOptions,
) -> Result<Box<dyn CorrespondenceDataset>, CorrError> {
    let request = DatasetRequest::parse(name, options)?;
    load_dataset(loader, &request)
}
