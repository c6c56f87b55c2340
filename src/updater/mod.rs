use log::{debug, info, warn};

use crate::engine::models::ChangeSet;
use crate::error::{Result, UpdaterError};
use crate::networking::Fetcher;

const LAST_BUILD: &str = "last-build";
const CHANGES: &str = "changes";
const ENTRY_PREFIX: &str = "./";

/// Layout of the update namespace on the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatePaths {
    root: String,
}

impl UpdatePaths {
    pub fn new(update_path: &str) -> Self {
        let trimmed = update_path.trim().trim_matches('/');
        let root = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        Self { root }
    }

    pub fn last_build(&self) -> String {
        format!("{}/{LAST_BUILD}", self.root)
    }

    pub fn version_dir(&self, version: u32) -> String {
        format!("{}/{version}", self.root)
    }

    pub fn changes(&self, version: u32) -> String {
        format!("{}/{CHANGES}", self.version_dir(version))
    }
}

/// Ask the server for the latest published build number.
pub async fn probe_latest_build<F>(fetcher: &F, paths: &UpdatePaths) -> Result<u32>
where
    F: Fetcher + ?Sized,
{
    let body = fetcher.fetch_text(&paths.last_build()).await?;
    let trimmed = body.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| UpdaterError::InvalidBuildNumber(trimmed.to_owned()))
}

/// Merge the change manifests of every version in `(current, latest]`.
pub async fn harvest_changes<F>(
    fetcher: &F,
    paths: &UpdatePaths,
    current: u32,
    latest: u32,
) -> ChangeSet
where
    F: Fetcher + ?Sized,
{
    info!("harvest: collecting changes");
    let mut changes = ChangeSet::new();

    if current == 0 || latest == 0 || current == latest {
        info!("harvest: stopped, current version is {current}, last version is {latest}");
        if current == 0 {
            info!("harvest: current version is unknown");
        }
        if latest == 0 {
            info!("harvest: last version is unknown");
        }
        return changes;
    }

    // Ascending order: later versions overwrite earlier entries.
    for version in current.saturating_add(1)..=latest {
        let changes_path = paths.changes(version);
        debug!("harvest: fetching {changes_path}");
        match fetcher.fetch_text(&changes_path).await {
            Ok(content) => {
                let entries = parse_changes(&paths.version_dir(version), &content);
                debug!("harvest: version {version} lists {} files", entries.len());
                changes.extend(entries);
            }
            Err(err) => debug!("harvest: skipping version {version}: {err}"),
        }
    }

    info!("harvest: {} files changed", changes.len());
    changes
}

/// Entries of one `changes` manifest as `(relative path, remote path)`.
pub fn parse_changes(version_dir: &str, content: &str) -> Vec<(String, String)> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix(ENTRY_PREFIX))
        .filter(|relative| !relative.is_empty())
        .filter(|relative| {
            let safe = is_contained(relative);
            if !safe {
                warn!("harvest: ignoring entry {relative:?} outside the install tree");
            }
            safe
        })
        .map(|relative| (relative.to_owned(), format!("{version_dir}/{relative}")))
        .collect()
}

/// True when `relative` stays inside the tree it is joined to.
fn is_contained(relative: &str) -> bool {
    !relative.starts_with('/')
        && !relative.contains('\\')
        && !has_drive_prefix(relative)
        && relative
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

/// `C:` style prefix on the first component.
fn has_drive_prefix(relative: &str) -> bool {
    let bytes = relative.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
