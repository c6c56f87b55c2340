use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{Result, UpdaterError};
use crate::storage;

const DEFAULT_PORT: u16 = 80;
const DEFAULT_SCHEME: &str = "http";
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Release channel the client follows. Reported in logs only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum UpdateLevel {
    Major,
    #[default]
    Minor,
    Test,
}

impl UpdateLevel {
    /// Case-insensitive lookup, `None` for anything unrecognised.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        [UpdateLevel::Major, UpdateLevel::Minor, UpdateLevel::Test]
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(label))
    }

    pub fn label(self) -> &'static str {
        match self {
            UpdateLevel::Major => "MAJOR",
            UpdateLevel::Minor => "MINOR",
            UpdateLevel::Test => "TEST",
        }
    }
}

impl fmt::Display for UpdateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub update: UpdateSection,
    pub application: ApplicationSection,
    pub keystore: Option<KeystoreSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateSection {
    /// Namespace under which `last-build` and the version folders live.
    pub path: String,
    pub level: Option<String>,
    /// Remote build number that is never offered as an update.
    pub ignore_version: u32,
    pub download_timeout_secs: u64,
    /// Skip installation when any file of the batch failed to download.
    pub require_complete: bool,
    pub server: ServerSection,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            path: String::new(),
            level: None,
            ignore_version: 0,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            require_complete: false,
            server: ServerSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.into(),
            host: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationSection {
    pub home: Option<PathBuf>,
    pub jar_path: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
}

/// Trust material handed to the HTTP transport.
#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreSection {
    pub path: PathBuf,
    #[serde(default)]
    pub password: Option<String>,
}

impl UpdaterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("config: loading {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| UpdaterError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: UpdaterConfig = toml::from_str(text)?;
        if config.update.server.host.trim().is_empty() {
            return Err(UpdaterError::InvalidUrl(
                "update.server.host is not set".into(),
            ));
        }
        if config
            .application
            .staging_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            return Err(UpdaterError::InvalidSetting(
                "application.staging_dir is empty".into(),
            ));
        }
        storage::check_staging(&config.staging_dir(), &config.application_home())?;
        Ok(config)
    }

    /// Configured level, falling back to MINOR when missing or unknown.
    pub fn level(&self) -> UpdateLevel {
        match self.update.level.as_deref() {
            None => UpdateLevel::default(),
            Some(label) => UpdateLevel::from_label(label).unwrap_or_else(|| {
                warn!("config: unknown update level {label:?}, using MINOR");
                UpdateLevel::default()
            }),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.update.download_timeout_secs)
    }

    /// Destination root for installed files.
    pub fn application_home(&self) -> PathBuf {
        self.application
            .home
            .as_deref()
            .map(env::resolve)
            .unwrap_or_else(env::working_dir)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.application
            .staging_dir
            .as_deref()
            .map(env::resolve)
            .unwrap_or_else(env::staging_dir)
    }

    pub fn jar_path(&self) -> Option<PathBuf> {
        self.application.jar_path.as_deref().map(env::resolve)
    }
}
