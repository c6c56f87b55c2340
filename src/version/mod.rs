use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::Serialize;
use zip::read::ZipArchive;

use crate::error::{Result, UpdaterError};

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const BUILD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build metadata stamped into the application archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build_number: u32,
    pub build_time: Option<NaiveDateTime>,
    pub app_version: Option<String>,
}

impl Version {
    /// Read the version from `META-INF/MANIFEST.MF` inside a JAR.
    pub fn from_jar(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut entry = archive.by_name(MANIFEST_ENTRY)?;
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        Self::parse_manifest(&text)
    }

    /// Parse the main section of a JAR manifest.
    pub fn parse_manifest(text: &str) -> Result<Self> {
        let attributes = main_attributes(text);
        let number = |name: &str| -> Result<u32> {
            match attributes.get(name).map(|value| value.trim()) {
                None | Some("") => Ok(0),
                Some(value) => value
                    .parse()
                    .map_err(|_| UpdaterError::InvalidManifest(format!("{name}: {value:?}"))),
            }
        };

        let build_time = attributes
            .get("Build-Time")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .and_then(|value| {
                NaiveDateTime::parse_from_str(value, BUILD_TIME_FORMAT)
                    .inspect_err(|err| warn!("version: unparsable Build-Time {value:?}: {err}"))
                    .ok()
            });

        Ok(Self {
            major: number("Major-Version")?,
            minor: number("Minor-Version")?,
            build_number: number("Build-Number")?,
            build_time,
            app_version: attributes.get("App-Version").cloned(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Major-Version: {}", self.major)?;
        writeln!(f, "Minor-Version: {}", self.minor)?;
        writeln!(f, "Build-Number: {}", self.build_number)?;
        match &self.build_time {
            Some(time) => writeln!(f, "Build-Time: {}", time.format(BUILD_TIME_FORMAT))?,
            None => writeln!(f, "Build-Time: -")?,
        }
        write!(f, "App-Version: {}", self.app_version.as_deref().unwrap_or("-"))
    }
}

/// Build number of the installed application, or 0 when it cannot be determined.
pub fn current_build_number(jar_path: Option<&Path>) -> u32 {
    let Some(path) = jar_path else {
        warn!("version: no application jar configured");
        return 0;
    };
    match Version::from_jar(path) {
        Ok(version) => {
            debug!("version: {} -> build {}", path.display(), version.build_number);
            version.build_number
        }
        Err(err) => {
            warn!("version: cannot read {}: {err}", path.display());
            0
        }
    }
}

/// Key/value pairs of the manifest main section, continuation lines joined.
fn main_attributes(text: &str) -> HashMap<String, String> {
    let mut attributes: HashMap<String, String> = HashMap::new();
    let mut last_key: Option<String> = None;

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix(' ') {
            if let Some(value) = last_key.as_ref().and_then(|key| attributes.get_mut(key)) {
                value.push_str(rest);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_owned();
            attributes.insert(key.clone(), value.trim_start().to_owned());
            last_key = Some(key);
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    const MANIFEST: &str = "Manifest-Version: 1.0\r\n\
Major-Version: 2\r\n\
Minor-Version: 7\r\n\
Build-Number: 1042\r\n\
Build-Time: 2024-03-05 14:30:00\r\n\
App-Version: 2.7-termi\r\n nal\r\n\
\r\n\
Name: com/example/\r\n\
Build-Number: 9\r\n";

    fn write_jar(path: &Path, manifest: &str) {
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(MANIFEST_ENTRY, options).unwrap();
        zip.write_all(manifest.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn parses_main_section() {
        let version = Version::parse_manifest(MANIFEST).unwrap();
        assert_eq!(version.major, 2);
        assert_eq!(version.minor, 7);
        assert_eq!(version.build_number, 1042);
        assert_eq!(
            version.build_time,
            NaiveDateTime::parse_from_str("2024-03-05 14:30:00", BUILD_TIME_FORMAT).ok()
        );
        assert_eq!(version.app_version.as_deref(), Some("2.7-terminal"));
    }

    #[test]
    fn joins_continuation_lines() {
        let text = "Build-Number: 7\nApp-Version: 3.1-long\n -suffix\n\nApp-Version: ignored\n";
        let version = Version::parse_manifest(text).unwrap();
        assert_eq!(version.build_number, 7);
        assert_eq!(version.app_version.as_deref(), Some("3.1-long-suffix"));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let version = Version::parse_manifest("Manifest-Version: 1.0\nBuild-Number: \n").unwrap();
        assert_eq!(version.major, 0);
        assert_eq!(version.build_number, 0);
        assert!(version.build_time.is_none());
        assert!(version.app_version.is_none());
    }

    #[test]
    fn bad_build_time_is_dropped() {
        let version = Version::parse_manifest("Build-Number: 3\nBuild-Time: yesterday\n").unwrap();
        assert_eq!(version.build_number, 3);
        assert!(version.build_time.is_none());
    }

    #[test]
    fn non_numeric_build_number_is_an_error() {
        let err = Version::parse_manifest("Build-Number: abc\n").unwrap_err();
        assert!(matches!(err, UpdaterError::InvalidManifest(_)));
    }

    #[test]
    fn reads_build_number_from_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("app.jar");
        write_jar(&jar, MANIFEST);

        let version = Version::from_jar(&jar).unwrap();
        assert_eq!(version.build_number, 1042);
        assert_eq!(current_build_number(Some(&jar)), 1042);
    }

    #[test]
    fn unknown_current_version_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(current_build_number(None), 0);
        assert_eq!(current_build_number(Some(&dir.path().join("missing.jar"))), 0);

        let not_a_jar = dir.path().join("plain.jar");
        fs::write(&not_a_jar, b"not a zip").unwrap();
        assert_eq!(current_build_number(Some(&not_a_jar)), 0);
    }

    #[test]
    fn renders_like_a_manifest() {
        let version = Version::parse_manifest(MANIFEST).unwrap();
        let text = version.to_string();
        assert!(text.contains("Build-Number: 1042"));
        assert!(text.contains("Build-Time: 2024-03-05 14:30:00"));
        assert!(text.ends_with("App-Version: 2.7-terminal"));
    }
}
