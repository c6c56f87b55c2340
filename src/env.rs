use std::env;
use std::path::{Component, Path, PathBuf};

const STAGING_DIR_NAME: &str = "tmp";
const CONFIG_FILE_NAME: &str = "updater.toml";

/// Working directory of the process; the default live installation root.
pub fn working_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Default scratch directory for downloaded files.
pub fn staging_dir() -> PathBuf {
    working_dir().join(STAGING_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    working_dir().join(CONFIG_FILE_NAME)
}

/// Resolve a configured path against the working directory.
pub fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir().join(path)
    }
}

/// Lexically drop `.` components and fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
