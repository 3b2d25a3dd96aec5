use crate::error::Result;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const NAME: &str = "Reflector";

/// Mirror status endpoint of archlinux.org.
pub const URL: &str = "https://archlinux.org/mirrors/status/json/";

/// Resource downloaded from each mirror when rating by speed.
pub const DB_SUBPATH: &str = "extra/os/x86_64/extra.db";

pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 5;
pub const DEFAULT_DOWNLOAD_TIMEOUT: u64 = 5;
pub const DEFAULT_CACHE_TIMEOUT: u64 = 300;
pub const DEFAULT_COMPLETION_PERCENT: f64 = 100.0;

/// Optional settings file. Every key mirrors a long command-line option and
/// is overridden by it.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub connection_timeout: Option<u64>,
    pub download_timeout: Option<u64>,
    pub cache_timeout: Option<u64>,
    pub total_timeout: Option<u64>,
    pub url: Option<String>,
    pub save: Option<PathBuf>,
    pub sort: Option<String>,
    pub threads: Option<usize>,
    pub verbose: Option<bool>,
    pub country: Vec<String>,
    pub protocol: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub age: Option<f64>,
    pub delay: Option<f64>,
    pub fastest: Option<usize>,
    pub latest: Option<usize>,
    pub score: Option<usize>,
    pub number: Option<usize>,
    pub completion_percent: Option<f64>,
    pub isos: Option<bool>,
    pub ipv4: Option<bool>,
    pub ipv6: Option<bool>,
}

impl Settings {
    /// Load settings from an explicit path, or from the user config directory
    /// (`~/.config/reflector/config.toml` on Linux) when that file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_settings_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&path)?;
        let settings = toml::from_str(&content)?;
        tracing::debug!("loaded settings from {:?}", path);
        Ok(settings)
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "reflector").map(|dirs| dirs.config_dir().join("config.toml"))
}
