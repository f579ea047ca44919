use anyhow::{Context, Result, bail};
use dotenv::dotenv;
use rand::{TryRngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::common::{DEFAULT_QUEUE_NAME, MISSING_IMAGE_LINK, NO_IMAGE_LINK};
use crate::config::{SettingsSource, load_settings_file};

pub const SERVER_CONFIG_ENV: &str = "SMASHPIX_CONFIG";
pub const DEFAULT_SERVER_CONFIG_PATH: &str = "smashpix.json";

/// Web application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Base URL under which this server is reachable; serving links are built from it.
    pub public_url: String,
    /// Root for the datastore file and the object buckets.
    pub data_dir: PathBuf,
    /// Bucket receiving user uploads. Writes to it raise change notifications.
    pub main_bucket: String,
    /// Bucket receiving the daemon's bitified images.
    pub bit_bucket: String,
    pub queue_name: String,
    /// Shared login password of the identity stand-in.
    pub password: String,
    /// JWT and policy signing secret.
    pub auth_key: Option<String>,
    /// Bearer key the worker uses for the queue and storage APIs.
    pub service_key: String,
    pub service_account_name: String,
    /// Where change notifications go. `None` dispatches them in-process.
    pub notification_url: Option<String>,
    pub upload_limit_mb: u64,
    /// Lease calls per queue and second before the queue answers 403. Zero disables the limit.
    pub lease_requests_per_sec: u32,
    pub no_image_link: String,
    pub missing_image_link: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
            public_url: "http://127.0.0.1:8000".to_string(),
            data_dir: PathBuf::from("./data"),
            main_bucket: "smashpix-uploads".to_string(),
            bit_bucket: "smashpix-bitified".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            password: "admin".to_string(),
            auth_key: None,
            service_key: "change-me".to_string(),
            service_account_name: "smashpix-daemon@localhost".to_string(),
            notification_url: None,
            upload_limit_mb: 20,
            lease_requests_per_sec: 20,
            no_image_link: NO_IMAGE_LINK.to_string(),
            missing_image_link: MISSING_IMAGE_LINK.to_string(),
        }
    }
}

/// Secrets and endpoints that may come from `SMASHPIX_*` environment variables.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    password: Option<String>,
    auth_key: Option<String>,
    service_key: Option<String>,
    public_url: Option<String>,
    notification_url: Option<String>,
}

static FALLBACK_SECRET_KEY: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let mut secret = vec![0u8; 32];
    OsRng
        .try_fill_bytes(&mut secret)
        .expect("Failed to generate random secret key");
    secret
});

impl ServerConfig {
    /// Settings plus where they came from, for logging after logger start-up.
    pub fn load() -> Result<(Self, SettingsSource)> {
        dotenv().ok();
        let path = std::env::var(SERVER_CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_SERVER_CONFIG_PATH.to_string());
        let (mut config, source): (Self, _) = load_settings_file(path.as_ref())?;
        let overrides = envy::prefixed("SMASHPIX_")
            .from_env::<EnvOverrides>()
            .context("failed to read SMASHPIX_* environment overrides")?;
        config.apply(overrides);
        config.validate()?;
        Ok((config, source))
    }

    /// Reject settings that would leave the worker endpoints open.
    pub fn validate(&self) -> Result<()> {
        if self.service_key.trim().is_empty() {
            bail!("serviceKey must not be empty");
        }
        Ok(())
    }

    fn apply(&mut self, overrides: EnvOverrides) {
        if let Some(password) = overrides.password {
            self.password = password;
        }
        if overrides.auth_key.is_some() {
            self.auth_key = overrides.auth_key;
        }
        if let Some(service_key) = overrides.service_key {
            self.service_key = service_key;
        }
        if let Some(public_url) = overrides.public_url {
            self.public_url = public_url;
        }
        if let Some(url) = overrides.notification_url.filter(|url| !url.trim().is_empty()) {
            self.notification_url = Some(url);
        }
    }

    pub fn get_jwt_secret_key(&self) -> Vec<u8> {
        match self.auth_key.as_ref() {
            Some(auth_key) => auth_key.as_bytes().to_vec(),
            None => FALLBACK_SECRET_KEY.clone(),
        }
    }

    /// Key for signing upload policies, derived from the JWT secret.
    pub fn policy_signing_key(&self) -> [u8; 32] {
        blake3::derive_key("smashpix upload policy v1", &self.get_jwt_secret_key())
    }

    pub fn public_base(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("smashpix.redb")
    }

    pub fn objects_root(&self) -> PathBuf {
        self.data_dir.join("objects")
    }
}
