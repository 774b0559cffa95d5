use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::CorrError;

/// What a `.tar.gz` contains, gathered without writing anything to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub entries: usize,
    pub total_bytes: u64,
    /// Names of all top-level members.
    pub top_level: BTreeSet<String>,
    /// Top-level members that are directories.
    pub top_level_dirs: BTreeSet<String>,
}

impl ArchiveLayout {
    /// Whether the archive wraps its content in a folder named `dirname`.
    pub fn is_nested_under(&self, dirname: &str) -> bool {
        self.top_level_dirs.contains(dirname)
    }

    /// The single top-level folder shared by every member, if there is one.
    pub fn shared_root(&self) -> Option<&str> {
        match (self.top_level.len(), self.top_level_dirs.first()) {
            (1, Some(root)) => Some(root.as_str()),
            _ => None,
        }
    }

    /// Top-level members other than `dirname`.
    pub fn siblings_of<'a>(&'a self, dirname: &'a str) -> impl Iterator<Item = &'a str> {
        self.top_level
            .iter()
            .map(String::as_str)
            .filter(move |name| *name != dirname)
    }
}

/// Reads every member of the archive through to the end so truncated
/// downloads and non-gzip payloads are caught before extraction starts.
pub fn inspect_tar_gz(archive_path: &Path) -> Result<ArchiveLayout, CorrError> {
    let corrupt = |reason: String| CorrError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason,
    };
    let file = fs::File::open(archive_path).map_err(|err| {
        CorrError::Filesystem(format!("open archive {}: {err}", archive_path.display()))
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut entries = 0usize;
    let mut total_bytes = 0u64;
    let mut top_level = BTreeSet::new();
    let mut top_level_dirs = BTreeSet::new();
    for entry in archive.entries().map_err(|err| corrupt(err.to_string()))? {
        let mut entry = entry.map_err(|err| corrupt(err.to_string()))?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|err| corrupt(err.to_string()))?
            .into_owned();
        let Some((root, depth)) = top_level_component(&path).map_err(corrupt)? else {
            continue;
        };
        if depth > 1 || entry_type.is_dir() {
            top_level_dirs.insert(root.clone());
        }
        top_level.insert(root);
        let expected = entry.size();
        let copied =
            io::copy(&mut entry, &mut io::sink()).map_err(|err| corrupt(err.to_string()))?;
        if copied != expected {
            return Err(corrupt(format!(
                "member {} truncated ({copied} of {expected} bytes)",
                path.display()
            )));
        }
        total_bytes += copied;
        entries += 1;
    }

    if entries == 0 {
        return Err(corrupt("archive contains no entries".to_string()));
    }

    Ok(ArchiveLayout {
        entries,
        total_bytes,
        top_level,
        top_level_dirs,
    })
}

pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<(), CorrError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        CorrError::Filesystem(format!("open archive {}: {err}", archive_path.display()))
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);
    fs::create_dir_all(target_dir).map_err(|err| CorrError::Filesystem(err.to_string()))?;
    archive.unpack(target_dir).map_err(|err| match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => CorrError::CorruptArchive {
            path: archive_path.to_path_buf(),
            reason: err.to_string(),
        },
        _ => CorrError::Filesystem(format!(
            "unpack {} into {}: {err}",
            archive_path.display(),
            target_dir.display()
        )),
    })
}

/// Moves extracted content from `staging` to `dest`. When the archive has a
/// top-level `dirname/` folder its contents land directly in `dest`, with any
/// other top-level members placed alongside them.
pub fn place_extracted(
    staging: &Path,
    layout: &ArchiveLayout,
    dirname: &str,
    dest: &Path,
) -> Result<(), CorrError> {
    if !layout.is_nested_under(dirname) {
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|err| CorrError::Filesystem(err.to_string()))?;
        }
        fs::create_dir_all(dest).map_err(|err| CorrError::Filesystem(err.to_string()))?;
        return move_children(staging, dest, None);
    }

    let nested = staging.join(dirname);
    if !nested.is_dir() {
        return Err(CorrError::Filesystem(format!(
            "extracted content missing at {}",
            nested.display()
        )));
    }
    for sibling in layout.siblings_of(dirname) {
        if nested.join(sibling).exists() {
            return Err(CorrError::Filesystem(format!(
                "top-level member {sibling} collides with {dirname}/{sibling}"
            )));
        }
    }
    move_children(staging, &nested, Some(dirname))?;

    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|err| CorrError::Filesystem(err.to_string()))?;
    }
    fs::rename(&nested, dest).map_err(|err| CorrError::Filesystem(err.to_string()))
}

fn move_children(from: &Path, to: &Path, skip: Option<&str>) -> Result<(), CorrError> {
    let entries = fs::read_dir(from).map_err(|err| CorrError::Filesystem(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| CorrError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        if skip.is_some_and(|skip| name == skip) {
            continue;
        }
        fs::rename(entry.path(), to.join(&name))
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// First normal component of a member path and the number of normal
/// components; `Ok(None)` for the archive root itself (`./`).
fn top_level_component(path: &Path) -> Result<Option<(String, usize)>, String> {
    let mut root = None;
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                if root.is_none() {
                    root = Some(part.to_string_lossy().into_owned());
                }
                depth += 1;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "member path escapes extraction root: {}",
                    path.display()
                ));
            }
        }
    }
    Ok(root.map(|root| (root, depth)))
}
