use anyhow::{Context, Result};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::DEFAULT_QUEUE_NAME;
use crate::config::{SettingsSource, load_settings_file};

pub const DAEMON_CONFIG_ENV: &str = "SMASHPIX_DAEMON_CONFIG";
pub const DEFAULT_DAEMON_CONFIG_PATH: &str = "daemon.json";

/// Worker daemon settings. Defaults mirror the values the pipeline was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Base URL of the web app, which also hosts the queue and storage APIs.
    pub app_url: String,
    pub queue_name: String,
    pub service_key: String,
    pub processed_bucket: String,
    /// One quote per line.
    pub quotes_file: PathBuf,
    pub log_filename: Option<PathBuf>,

    pub num_tasks_to_lease: usize,
    pub lease_time_sec: u64,
    pub sleep_time_after_tasks_sec: u64,
    pub sleep_time_after_no_tasks_sec: u64,
    pub sleep_time_rate_limit_sec: u64,
    pub request_timeout_sec: u64,

    /// Number of palette colors.
    pub bit_depth: usize,
    /// Smaller values give coarser pixels.
    pub thumbnail_width: u32,
    pub final_width: u32,
    pub font_ttf: PathBuf,
    pub font_size: f32,
    pub quote_text_color: String,
    pub quote_bg_color: String,
    pub border_edge_size_pixels: u32,
    pub border_color: String,

    pub heartbeat_address: String,
    pub heartbeat_port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            app_url: "http://127.0.0.1:8000".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            service_key: "change-me".to_string(),
            processed_bucket: "smashpix-bitified".to_string(),
            quotes_file: PathBuf::from("quotes.txt"),
            log_filename: Some(PathBuf::from("task-queue-reader.log")),
            num_tasks_to_lease: 5,
            lease_time_sec: 5,
            sleep_time_after_tasks_sec: 1,
            sleep_time_after_no_tasks_sec: 4,
            sleep_time_rate_limit_sec: 10,
            request_timeout_sec: 30,
            bit_depth: 8,
            thumbnail_width: 64,
            final_width: 768,
            font_ttf: PathBuf::from("/usr/share/fonts/truetype/freefont/FreeSans.ttf"),
            font_size: 20.0,
            quote_text_color: "#FFF".to_string(),
            quote_bg_color: "#000".to_string(),
            border_edge_size_pixels: 10,
            border_color: "#EEE".to_string(),
            heartbeat_address: "0.0.0.0".to_string(),
            heartbeat_port: 9000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    app_url: Option<String>,
    service_key: Option<String>,
}

impl DaemonConfig {
    /// Settings plus where they came from, for logging after logger start-up.
    pub fn load() -> Result<(Self, SettingsSource)> {
        dotenv().ok();
        let path = std::env::var(DAEMON_CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_DAEMON_CONFIG_PATH.to_string());
        let (mut config, source): (Self, _) = load_settings_file(path.as_ref())?;
        let overrides = envy::prefixed("SMASHPIX_DAEMON_")
            .from_env::<EnvOverrides>()
            .context("failed to read SMASHPIX_DAEMON_* environment overrides")?;
        if let Some(app_url) = overrides.app_url {
            config.app_url = app_url;
        }
        if let Some(service_key) = overrides.service_key {
            config.service_key = service_key;
        }
        Ok((config, source))
    }

    pub fn app_base(&self) -> &str {
        self.app_url.trim_end_matches('/')
    }

    pub fn sleep_after_tasks(&self) -> Duration {
        Duration::from_secs(self.sleep_time_after_tasks_sec)
    }

    pub fn sleep_after_no_tasks(&self) -> Duration {
        Duration::from_secs(self.sleep_time_after_no_tasks_sec)
    }

    pub fn sleep_rate_limit(&self) -> Duration {
        Duration::from_secs(self.sleep_time_rate_limit_sec)
    }
}
