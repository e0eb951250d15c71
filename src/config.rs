use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the local archive. Example: `/data/downloads/processed`
    pub processed_dir: PathBuf,
    /// Seconds to sleep between two scans of the watch directories.
    #[serde(default = "default_interval")]
    pub interval_s: u64,
    /// Put archived files under `<processed_dir>/<category>/...`
    #[serde(default = "default_true")]
    pub archive_by_category: bool,

    pub alist: AlistConfig,
    #[serde(default)]
    pub watch: Vec<WatchMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlistConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Offline download tool. Example: `PikPak`
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default = "default_delete_policy")]
    pub delete_policy: String,
    /// How long a freshly created directory may stay invisible.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_s: u64,
}

/// A local directory whose descriptor files are sent to `cloud`.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchMapping {
    pub category: String,
    pub local: PathBuf,
    pub cloud: String,
}

fn default_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_tool() -> String {
    "PikPak".to_string()
}

fn default_delete_policy() -> String {
    "delete_on_upload_succeed".to_string()
}

fn default_ready_timeout() -> u64 {
    30
}

/// Built-in locations for the two stock categories.
fn default_watch(category: &str) -> Option<(&'static str, &'static str)> {
    match category {
        "TV" => Some(("/data/downloads/incoming/TV", "/pikpak/Media/TV")),
        "Movie" => Some(("/data/downloads/incoming/Movie", "/pikpak/Media/Movie")),
        _ => None,
    }
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, Error> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut missing = vec![];

        let host = required(&lookup, "ALIST_HOST", &mut missing);
        let username = required(&lookup, "ALIST_USERNAME", &mut missing);
        let password = required(&lookup, "ALIST_PASSWORD", &mut missing);
        let processed_dir = required(&lookup, "PROCESSED_DIR", &mut missing);

        let categories = lookup("WATCH_CATEGORIES").unwrap_or_else(|| "TV,Movie".to_string());
        let mut watch = vec![];
        for category in categories.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let upper = category.to_uppercase();
            let local_key = format!("WATCH_DIR_{upper}");
            let cloud_key = format!("ALIST_PATH_{upper}");
            let defaults = default_watch(category);
            let local = lookup(&local_key).or_else(|| defaults.map(|d| d.0.to_string()));
            let cloud = lookup(&cloud_key).or_else(|| defaults.map(|d| d.1.to_string()));
            match (local, cloud) {
                (Some(local), Some(cloud)) => watch.push(WatchMapping {
                    category: category.to_string(),
                    local: local.into(),
                    cloud,
                }),
                (local, cloud) => {
                    if local.is_none() {
                        missing.push(local_key);
                    }
                    if cloud.is_none() {
                        missing.push(cloud_key);
                    }
                }
            }
        }

        if !missing.is_empty() {
            return Err(Error::MissingConfig(missing));
        }

        let mut config = Config {
            processed_dir: processed_dir.into(),
            interval_s: number(&lookup, "CHECK_INTERVAL", default_interval())?,
            archive_by_category: flag(&lookup, "ARCHIVE_BY_CATEGORY", true)?,
            alist: AlistConfig {
                host,
                username,
                password,
                tool: lookup("ALIST_TOOL").unwrap_or_else(default_tool),
                delete_policy: lookup("ALIST_DELETE_POLICY").unwrap_or_else(default_delete_policy),
                ready_timeout_s: number(&lookup, "PATH_READY_TIMEOUT", default_ready_timeout())?,
            },
            watch,
        };
        config.validate()?;
        Ok(config)
    }

    /// Normalizes the host and rejects configs that cannot work at all.
    pub fn validate(&mut self) -> Result<(), Error> {
        self.alist.host = self.alist.host.trim_end_matches('/').to_string();
        if let Err(e) = self.alist.host.parse::<url::Url>() {
            return Err(Error::InvalidConfig {
                key: "ALIST_HOST".to_string(),
                reason: e.to_string(),
            });
        }
        if self.watch.is_empty() {
            return Err(Error::InvalidConfig {
                key: "WATCH_CATEGORIES".to_string(),
                reason: "no watch directory configured".to_string(),
            });
        }
        Ok(())
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str, missing: &mut Vec<String>) -> String {
    lookup(key).unwrap_or_else(|| {
        missing.push(key.to_string());
        String::new()
    })
}

fn number(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64, Error> {
    match lookup(key) {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e: std::num::ParseIntError| Error::InvalidConfig {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, Error> {
    let Some(s) = lookup(key) else {
        return Ok(default);
    };
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(Error::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}
