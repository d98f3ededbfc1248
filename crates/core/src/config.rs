use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Local, Offset};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;
use serde::Deserialize;

static CONFIG_FILE_NAME: &str = "config.json";
static ENV_DATA_DIR: &str = "CADENCE_DATA_DIR";
static ENV_API_URL: &str = "CADENCE_API_URL";
static ENV_API_TOKEN: &str = "CADENCE_API_TOKEN";
static DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "cadence", "cadence"));

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    api_url: Option<String>,
    request_timeout_secs: Option<u64>,
    utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    api_url: String,
    api_token: Option<String>,
    request_timeout: Duration,
    utc_offset: FixedOffset,
}

impl AppConfig {
    /// Construct [`AppConfig`] by resolving the data directory using the provided override,
    /// environment variables, and platform defaults, then applying `CADENCE_API_URL` and
    /// `CADENCE_API_TOKEN` on top of the config file.
    pub fn discover(data_dir_override: Option<PathBuf>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir_override)?;
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory at {}", data_dir.display())
            })?;
        }
        let mut config = Self::from_data_dir(data_dir)?;
        if let Ok(url) = env::var(ENV_API_URL) {
            config.api_url = normalize_url(&url);
        }
        if let Ok(token) = env::var(ENV_API_TOKEN) {
            config = config.with_token(Some(token));
        }
        Ok(config)
    }

    /// Construct [`AppConfig`] from a resolved data directory and its optional `config.json`.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        let file = read_file_config(&data_dir.join(CONFIG_FILE_NAME))?;
        let utc_offset = match file.utc_offset_minutes {
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| anyhow!("utcOffsetMinutes out of range: {}", minutes))?,
            None => Local::now().offset().fix(),
        };
        Ok(Self {
            data_dir,
            api_url: normalize_url(file.api_url.as_deref().unwrap_or(DEFAULT_API_URL)),
            api_token: None,
            request_timeout: Duration::from_secs(
                file.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            utc_offset,
        })
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = normalize_url(url);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.api_token = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file at {}", path.display()))
}

fn resolve_data_dir(data_dir_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = data_dir_override {
        return Ok(dir);
    }

    if let Ok(env_dir) = env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(env_dir));
    }

    if cfg!(debug_assertions) {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let dev_dir = manifest_dir.join("..").join("tmp").join("dev-cadence");
        return Ok(dev_dir);
    }

    if let Some(project) = &*PROJECT_DIRS {
        return Ok(project.config_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".cadence"));
    }

    Ok(env::current_dir()?.join(".cadence"))
}
