//! Daemon configuration, read from a TOML file.
//!
//! ```toml
//! data_dir = "/var/lib/tenantgrid"
//! resync_interval_secs = 30
//! log_format = "json"
//! conflict_retries = 5
//!
//! [scheduling]
//! namespace = "tenantgrid-system"
//! name = "default"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use tenantgrid_lifecycle::LifecycleConfig;
use tenantgrid_state::ObjectRef;

const DB_FILE: &str = "tenantgrid.redb";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the redb file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    /// TargetScheduling object with the manual rules.
    #[serde(default)]
    pub scheduling: Option<SchedulingConfig>,

    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulingConfig {
    pub namespace: String,
    pub name: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/tenantgrid")
}

fn default_resync_interval() -> u64 {
    30
}

fn default_conflict_retries() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            resync_interval_secs: default_resync_interval(),
            log_format: LogFormat::default(),
            scheduling: None,
            conflict_retries: default_conflict_retries(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(raw)?;
        if config.resync_interval_secs == 0 {
            bail!("resync_interval_secs must be greater than zero");
        }
        if let Some(scheduling) = &config.scheduling {
            if scheduling.name.is_empty() {
                bail!("scheduling.name must not be empty");
            }
        }
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            scheduling: self
                .scheduling
                .as_ref()
                .map(|s| ObjectRef::new(&s.namespace, &s.name)),
            conflict_retries: self.conflict_retries,
        }
    }
}
