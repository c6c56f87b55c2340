use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::Fetcher;
use crate::error::{Result, UpdaterError};

/// In-memory update server for pipeline tests.
#[derive(Default)]
pub struct MemoryFetcher {
    entries: HashMap<String, Vec<u8>>,
    stalled: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(path.to_owned(), body.into());
        self
    }

    /// Requests for `path` never complete.
    pub fn stalled(mut self, path: &str) -> Self {
        self.stalled.insert(path.to_owned());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn lookup(&self, path: &str) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(path.to_owned());
        }
        if self.stalled.contains(path) {
            std::future::pending::<()>().await;
        }
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| UpdaterError::Status {
                url: path.to_owned(),
                status: 404,
            })
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_text(&self, path: &str) -> Result<String> {
        let bytes = self.lookup(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.lookup(path).await
    }
}
