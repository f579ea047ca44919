pub mod daemon;
pub mod server;

use anyhow::{Context, Result};
use log::info;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Where a settings value came from. Logged once the logger is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    File(PathBuf),
    Defaults(PathBuf),
}

impl SettingsSource {
    pub fn log(&self) {
        match self {
            SettingsSource::File(path) => info!("Loaded settings from {:?}", path),
            SettingsSource::Defaults(path) => {
                info!("No settings file at {:?}, using defaults", path)
            }
        }
    }
}

/// Read a JSON settings file, falling back to `T::default()` when it is absent.
pub fn load_settings_file<T: DeserializeOwned + Default>(
    path: &Path,
) -> Result<(T, SettingsSource)> {
    if !path.exists() {
        return Ok((T::default(), SettingsSource::Defaults(path.to_path_buf())));
    }
    let file = File::open(path).with_context(|| format!("failed to open settings {:?}", path))?;
    let settings = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse settings {:?}", path))?;
    Ok((settings, SettingsSource::File(path.to_path_buf())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::daemon::DaemonConfig;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn missing_file_reports_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        let (config, source): (DaemonConfig, _) = load_settings_file(&path).unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(source, SettingsSource::Defaults(path));
    }

    #[test]
    fn present_file_reports_its_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.json");
        let mut file = File::create(&path).unwrap();
        file.write_all(br#"{"bitDepth": 4}"#).unwrap();
        let (config, source): (DaemonConfig, _) = load_settings_file(&path).unwrap();
        assert_eq!(config.bit_depth, 4);
        assert_eq!(source, SettingsSource::File(path));
    }
}
