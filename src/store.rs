use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, TempDir};

use crate::domain::Benchmark;
use crate::error::CorrError;

pub const DEFAULT_DATAPATH: &str = "../Datasets_CATs";

const METADATA_DIR: &str = ".corrbench";

/// Layout of the caller-supplied `datapath` root.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn dataset_dir(&self, benchmark: Benchmark) -> Utf8PathBuf {
        self.root.join(benchmark.canonical_dirname())
    }

    pub fn archive_path(&self, benchmark: Benchmark) -> Utf8PathBuf {
        self.root
            .join(format!("{}.tar.gz", benchmark.canonical_dirname()))
    }

    pub fn staging_prefix(benchmark: Benchmark) -> String {
        format!("{}_tmp", benchmark.canonical_dirname())
    }

    pub fn metadata_path(&self, benchmark: Benchmark) -> Utf8PathBuf {
        self.root
            .join(METADATA_DIR)
            .join(format!("{}.json", benchmark.as_str()))
    }

    pub fn ensure_root(&self) -> Result<(), CorrError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| CorrError::Filesystem(err.to_string()))
    }

    pub fn dataset_exists(&self, benchmark: Benchmark) -> bool {
        self.dataset_dir(benchmark).as_std_path().is_dir()
    }

    /// Temporary extraction directory next to the final one so the move into
    /// place stays on one filesystem. Removed when dropped.
    pub fn staging_dir(&self, benchmark: Benchmark) -> Result<TempDir, CorrError> {
        Builder::new()
            .prefix(&Self::staging_prefix(benchmark))
            .tempdir_in(self.root.as_std_path())
            .map_err(|err| CorrError::Filesystem(err.to_string()))
    }

    /// Removes the dataset directory plus any archive, staging or metadata
    /// leftovers. Returns whether anything was deleted.
    pub fn remove_dataset(&self, benchmark: Benchmark) -> Result<bool, CorrError> {
        let mut removed = false;
        let dataset_dir = self.dataset_dir(benchmark);
        if dataset_dir.as_std_path().exists() {
            fs::remove_dir_all(dataset_dir.as_std_path())
                .map_err(|err| CorrError::Filesystem(err.to_string()))?;
            removed = true;
        }
        for file in [self.archive_path(benchmark), self.metadata_path(benchmark)] {
            if file.as_std_path().exists() {
                fs::remove_file(file.as_std_path())
                    .map_err(|err| CorrError::Filesystem(err.to_string()))?;
                removed = true;
            }
        }
        for staging in self.staging_leftovers(benchmark)? {
            fs::remove_dir_all(staging.as_std_path())
                .map_err(|err| CorrError::Filesystem(err.to_string()))?;
            removed = true;
        }
        Ok(removed)
    }

    pub fn staging_leftovers(&self, benchmark: Benchmark) -> Result<Vec<Utf8PathBuf>, CorrError> {
        if !self.root.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let prefix = Self::staging_prefix(benchmark);
        let mut leftovers = Vec::new();
        let entries = self
            .root
            .read_dir_utf8()
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CorrError::Filesystem(err.to_string()))?;
            if entry.file_name().starts_with(&prefix) && entry.path().is_dir() {
                leftovers.push(entry.path().to_path_buf());
            }
        }
        leftovers.sort();
        Ok(leftovers)
    }

    pub fn write_metadata(&self, metadata: &Metadata) -> Result<(), CorrError> {
        let benchmark: Benchmark = metadata.benchmark.parse()?;
        let path = self.metadata_path(benchmark);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_metadata(&self, benchmark: Benchmark) -> Result<Option<Metadata>, CorrError> {
        let path = self.metadata_path(benchmark);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        let metadata = serde_json::from_str(&content)
            .map_err(|err| CorrError::Filesystem(format!("metadata {path}: {err}")))?;
        Ok(Some(metadata))
    }
}

/// Provenance of a downloaded dataset, kept outside the dataset directory so
/// loaders see the archive contents only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub benchmark: String,
    pub remote_id: String,
    pub canonical_dirname: String,
    pub archive_bytes: u64,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new("/tmp/data");
        assert_eq!(
            store.dataset_dir(Benchmark::Spair),
            Utf8PathBuf::from("/tmp/data/SPair-71k")
        );
        assert_eq!(
            store.archive_path(Benchmark::Spair),
            Utf8PathBuf::from("/tmp/data/SPair-71k.tar.gz")
        );
        assert!(
            store
                .metadata_path(Benchmark::PfPascal)
                .ends_with(".corrbench/pfpascal.json")
        );
        assert_eq!(Store::staging_prefix(Benchmark::Cubs), "CUB_200_2011_tmp");
    }

    #[test]
    fn staging_dir_is_removed_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);

        let staging = store.staging_dir(Benchmark::PfWillow).unwrap();
        let path = staging.path().to_path_buf();
        assert!(path.is_dir());
        assert_eq!(store.staging_leftovers(Benchmark::PfWillow).unwrap().len(), 1);
        drop(staging);

        assert!(!path.exists());
        assert!(store.staging_leftovers(Benchmark::PfWillow).unwrap().is_empty());
    }
}
