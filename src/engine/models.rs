use std::collections::BTreeMap;
use std::collections::btree_map;
use std::time::Duration;

use serde::Serialize;

/// Files to fetch for one update run: relative path -> remote source path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    entries: BTreeMap<String, String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any earlier source for the same path.
    pub fn insert(&mut self, relative: impl Into<String>, remote: impl Into<String>) {
        self.entries.insert(relative.into(), remote.into());
    }

    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.entries.extend(entries);
    }

    #[cfg(test)]
    pub fn get(&self, relative: &str) -> Option<&str> {
        self.entries.get(relative).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Inputs of the should-update decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UpdatePlan {
    pub current_version: u32,
    pub latest_version: u32,
    pub ignored_version: u32,
}

impl UpdatePlan {
    pub fn should_update(&self) -> bool {
        self.current_version != 0
            && self.latest_version != 0
            && self.current_version < self.latest_version
            && self.latest_version != self.ignored_version
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub files_downloaded: usize,
    /// Relative paths that could not be fetched or written.
    pub files_failed: Vec<String>,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.files_failed.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub files_installed: usize,
    pub total_bytes: u64,
}

/// What one `update()` run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub changes: usize,
    pub download: Option<DownloadReport>,
    pub download_error: Option<String>,
    pub install: Option<InstallReport>,
    pub install_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(current: u32, latest: u32, ignored: u32) -> UpdatePlan {
        UpdatePlan {
            current_version: current,
            latest_version: latest,
            ignored_version: ignored,
        }
    }

    #[test]
    fn update_only_when_strictly_newer_and_not_ignored() {
        assert!(plan(10, 12, 0).should_update());
        assert!(plan(10, 12, 11).should_update());
        assert!(!plan(12, 12, 0).should_update());
        assert!(!plan(13, 12, 0).should_update());
        assert!(!plan(10, 12, 12).should_update());
        assert!(!plan(0, 12, 0).should_update());
        assert!(!plan(10, 0, 0).should_update());
    }

    #[test]
    fn gate_is_closed_for_every_non_newer_pair() {
        for current in 1..20 {
            for latest in 1..=current {
                assert!(!plan(current, latest, 0).should_update());
            }
            assert!(!plan(current, current + 5, current + 5).should_update());
        }
    }

    #[test]
    fn later_insert_replaces_earlier_source() {
        let mut changes = ChangeSet::new();
        changes.insert("a.txt", "/terminal/5/a.txt");
        changes.insert("a.txt", "/terminal/7/a.txt");
        changes.extend([("b.txt".to_owned(), "/terminal/7/b.txt".to_owned())]);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.get("a.txt"), Some("/terminal/7/a.txt"));
        assert_eq!(changes.get("b.txt"), Some("/terminal/7/b.txt"));
    }

    #[test]
    fn serialises_as_a_plain_map() {
        let mut changes = ChangeSet::new();
        changes.insert("lib/x.jar", "/terminal/3/lib/x.jar");
        let json = serde_json::to_string(&changes).unwrap();
        assert_eq!(json, r#"{"lib/x.jar":"/terminal/3/lib/x.jar"}"#);
    }
}
