use std::fs;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::BenchmarkRequest;
use crate::dataset::{CorrespondenceDataset, DatasetLoader, DatasetOptions, DatasetRequest};
use crate::domain::{Benchmark, Split, ThresholdPolicy};
use crate::drive::{DriveTransport, download_archive};
use crate::error::CorrError;
use crate::fs_util;
use crate::store::{Metadata, Store};

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub benchmark: String,
    pub dirname: String,
    pub action: String,
    pub path: String,
    pub archive_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datapath: String,
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub benchmark: String,
    pub dirname: String,
    pub present: bool,
    pub manual: bool,
    pub path: String,
    pub downloaded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub benchmark: String,
    pub dirname: String,
    pub remote_id: Option<String>,
    pub present: bool,
    pub path: String,
    pub metadata: Option<Metadata>,
    pub loader: LoaderSettings,
}

/// What a dataset loader receives for one benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct LoaderSettings {
    pub dataset_root: String,
    pub thres: ThresholdPolicy,
    pub split: Split,
    pub feature_size: u32,
    pub sub_class: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub benchmark: String,
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

#[derive(Clone)]
pub struct App<T: DriveTransport> {
    store: Store,
    drive: T,
}

impl<T: DriveTransport> App<T> {
    pub fn new(store: Store, drive: T) -> Self {
        Self { store, drive }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn drive(&self) -> &T {
        &self.drive
    }

    pub fn fetch(
        &self,
        benchmarks: &[Benchmark],
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, CorrError> {
        let mut items = Vec::new();
        for benchmark in benchmarks {
            items.push(self.fetch_single(*benchmark, options, sink)?);
        }
        Ok(FetchResult { items })
    }

    /// Ensures `datapath/<canonical dirname>` exists in its canonical layout,
    /// downloading and unpacking the archive when it does not.
    pub fn fetch_single(
        &self,
        benchmark: Benchmark,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, CorrError> {
        let dirname = benchmark.canonical_dirname();
        let dataset_dir = self.store.dataset_dir(benchmark);
        emit(sink, format!("phase=Resolve; {benchmark} -> {dataset_dir}"));

        if !options.dry_run {
            self.store.ensure_root()?;
        }

        let item = |action: &str, archive_bytes: Option<u64>| FetchItemResult {
            benchmark: benchmark.to_string(),
            dirname: dirname.to_string(),
            action: action.to_string(),
            path: dataset_dir.to_string(),
            archive_bytes,
        };

        if !options.force && self.store.dataset_exists(benchmark) {
            tracing::info!(%benchmark, path = %dataset_dir, "dataset already present");
            emit(sink, "phase=Store; already present");
            return Ok(item("present", None));
        }

        let Some(remote_id) = benchmark.remote_token() else {
            return Err(CorrError::ManualAcquisitionRequired {
                benchmark: benchmark.to_string(),
                path: dataset_dir.clone().into_std_path_buf(),
            });
        };

        if options.dry_run {
            return Ok(item("dry-run", None));
        }

        let archive_path = self.store.archive_path(benchmark);
        emit(sink, format!("phase=Prepare; archive {archive_path}"));
        emit(sink, format!("phase=Fetch; requesting {remote_id}"));
        tracing::info!(%benchmark, remote_id, archive = %archive_path, "downloading");
        let start = Instant::now();
        let download = {
            let mut session = self.drive.open_session()?;
            download_archive(session.as_mut(), remote_id, archive_path.as_std_path())?
        };
        let latency = start.elapsed().as_millis();
        sink.event(ProgressEvent {
            message: format!(
                "drive.response latency_ms={latency} bytes={} confirmed={}",
                download.bytes, download.confirmed
            ),
            elapsed: Some(start.elapsed()),
        });

        emit(sink, format!("phase=Verify; inspecting {archive_path}"));
        let layout = fs_util::inspect_tar_gz(archive_path.as_std_path())?;
        tracing::debug!(?layout, "archive inspected");

        emit(sink, format!("phase=Store; extracting {archive_path}"));
        let staging = self.store.staging_dir(benchmark)?;
        fs_util::extract_tar_gz(archive_path.as_std_path(), staging.path())?;
        if !layout.is_nested_under(dirname) {
            tracing::warn!(
                %benchmark,
                top_level = ?layout.top_level,
                "archive has no {dirname}/ folder; keeping its layout"
            );
        } else if layout.shared_root().is_none() {
            let siblings: Vec<_> = layout.siblings_of(dirname).collect();
            tracing::info!(%benchmark, ?siblings, "keeping extra top-level members");
        }
        fs_util::place_extracted(
            staging.path(),
            &layout,
            dirname,
            dataset_dir.as_std_path(),
        )?;
        staging
            .close()
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;

        fs::remove_file(archive_path.as_std_path())
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;

        self.store.write_metadata(&Metadata {
            benchmark: benchmark.to_string(),
            remote_id: remote_id.to_string(),
            canonical_dirname: dirname.to_string(),
            archive_bytes: download.bytes,
            downloaded_at: iso_timestamp(),
            tool: format!("corrbench/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: dataset_dir.to_string(),
        })?;
        tracing::info!(%benchmark, path = %dataset_dir, entries = layout.entries, "dataset ready");

        Ok(item("download", Some(download.bytes)))
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, CorrError> {
        emit(sink, format!("phase=Resolve; scanning {}", self.store.root()));
        let mut datasets = Vec::new();
        for benchmark in Benchmark::ALL {
            let metadata = self.store.read_metadata(benchmark)?;
            datasets.push(ListEntry {
                benchmark: benchmark.to_string(),
                dirname: benchmark.canonical_dirname().to_string(),
                present: self.store.dataset_exists(benchmark),
                manual: benchmark.remote_token().is_none(),
                path: self.store.dataset_dir(benchmark).to_string(),
                downloaded_at: metadata.map(|meta| meta.downloaded_at),
            });
        }
        Ok(ListResult {
            datapath: self.store.root().to_string(),
            datasets,
        })
    }

    pub fn info(
        &self,
        request: &BenchmarkRequest,
        sink: &dyn ProgressSink,
    ) -> Result<InfoResult, CorrError> {
        let benchmark = request.benchmark;
        emit(sink, format!("phase=Resolve; looking up {benchmark}"));
        let present = self.store.dataset_exists(benchmark);
        let metadata = self.store.read_metadata(benchmark)?;
        if !present && metadata.is_none() {
            return Err(CorrError::DatasetNotFound(format!(
                "{benchmark} ({})",
                self.store.dataset_dir(benchmark)
            )));
        }
        let options = request.dataset_options(&Utf8PathBuf::from(self.store.root()));
        let dataset_root = DatasetRequest::new(benchmark, options.clone()).dataset_root();
        Ok(InfoResult {
            benchmark: benchmark.to_string(),
            dirname: benchmark.canonical_dirname().to_string(),
            remote_id: benchmark.remote_token().map(str::to_string),
            present,
            path: self.store.dataset_dir(benchmark).to_string(),
            metadata,
            loader: LoaderSettings {
                dataset_root: dataset_root.to_string(),
                thres: options.thres,
                split: options.split,
                feature_size: options.feature_size,
                sub_class: options.sub_class.to_string(),
            },
        })
    }

    pub fn clear(
        &self,
        benchmark: Benchmark,
        sink: &dyn ProgressSink,
    ) -> Result<ClearResult, CorrError> {
        emit(sink, format!("phase=Store; clearing {benchmark}"));
        let cleared = self.store.remove_dataset(benchmark)?;
        Ok(ClearResult {
            benchmark: benchmark.to_string(),
            cleared,
        })
    }

    /// Download-if-missing followed by loader dispatch. The name is validated
    /// before anything touches the disk or the network.
    pub fn open_dataset<L: DatasetLoader + ?Sized>(
        &self,
        loader: &L,
        name: &str,
        options: DatasetOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Box<dyn CorrespondenceDataset>, CorrError> {
        let benchmark: Benchmark = name.parse()?;
        self.fetch_single(benchmark, FetchOptions::default(), sink)?;
        let options = DatasetOptions {
            datapath: Utf8PathBuf::from(self.store.root()),
            ..options
        };
        crate::dataset::load_dataset(loader, &DatasetRequest::new(benchmark, options))
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
