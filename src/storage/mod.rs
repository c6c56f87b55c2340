use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::engine::models::InstallReport;
use crate::env;
use crate::error::{Result, UpdaterError};

/// Scratch directory that receives downloaded files before installation.
#[derive(Clone, Debug)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed and remove everything left by an earlier run.
    /// Subdirectories are removed with their contents.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let removed = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(err) = removed {
                warn!("staging: failed to remove {}: {err}", path.display());
            }
        }
        debug!("staging: {} is clean", self.root.display());
        Ok(())
    }
}

/// Fails when clearing `staging` would delete anything under `live_root`.
pub fn check_staging(staging: &Path, live_root: &Path) -> Result<()> {
    let staging = env::normalize(staging);
    let live_root = env::normalize(live_root);
    if live_root.starts_with(&staging) {
        return Err(UpdaterError::InvalidSetting(format!(
            "staging directory {} contains the application home {}",
            staging.display(),
            live_root.display()
        )));
    }
    Ok(())
}

/// Copy every staged file into `live_root`, keeping its relative path.
///
/// Each destination is replaced through a temporary sibling and a rename. The
/// first failure stops the walk; files copied before it stay in place.
pub fn apply_staged(staging_root: &Path, live_root: &Path) -> Result<InstallReport> {
    let mut report = InstallReport::default();
    if !staging_root.exists() {
        return Ok(report);
    }

    for entry in WalkDir::new(staging_root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(staging_root)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let dest = live_root.join(relative);
        let bytes = replace_file(entry.path(), &dest)?;
        debug!("install: {} -> {}", relative.display(), dest.display());
        report.files_installed += 1;
        report.total_bytes += bytes;
    }

    info!(
        "install: {} files into {}",
        report.files_installed,
        live_root.display()
    );
    Ok(report)
}

fn replace_file(src: &Path, dest: &Path) -> Result<u64> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::other(format!("{} has no parent", dest.display())))?;
    fs::create_dir_all(parent)?;

    // Replaced files keep their mode; new files take the staged file's.
    let permissions = match fs::metadata(dest) {
        Ok(existing) => existing.permissions(),
        Err(_) => fs::metadata(src)?.permissions(),
    };

    let mut input = fs::File::open(src)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    let bytes = io::copy(&mut input, temp.as_file_mut())?;
    temp.as_file().set_permissions(permissions)?;
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|err| err.error)?;
    Ok(bytes)
}
