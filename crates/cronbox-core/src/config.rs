use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (cronbox.toml + CRONBOX_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronboxConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for CronboxConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scripts: ScriptsConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Directory holding materialized script files, one subdirectory per
    /// script kind (`shell/`, `python/`).
    #[serde(default = "default_scripts_dir")]
    pub dir: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: default_scripts_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long `stop` waits for in-flight job callbacks before giving up.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.cronbox/cronbox.db")
}

fn default_scripts_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.cronbox/scripts")
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl CronboxConfig {
    /// Load config from a TOML file with CRONBOX_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.cronbox/cronbox.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CronboxConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CRONBOX_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.cronbox/cronbox.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = CronboxConfig::default();
        assert!(config.database.path.ends_with("cronbox.db"));
        assert!(config.scripts.dir.ends_with("scripts"));
        assert_eq!(config.scheduler.shutdown_timeout_secs, 30);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        // Figment treats a missing TOML file as an empty provider, so loading
        // a nonexistent path yields the serde defaults rather than an error.
        let config = CronboxConfig::load(Some("/nonexistent/cronbox.toml")).unwrap();
        assert_eq!(
            config.scheduler.shutdown_timeout_secs,
            CronboxConfig::default().scheduler.shutdown_timeout_secs
        );
    }
}
