use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl CoreConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<CoreConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using CoreConfig::default().",
                path.display()
            );
            CoreConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.store.db_path = absolutize(root, &self.store.db_path);
        self.commission.schedules_path = absolutize(root, &self.commission.schedules_path);
        self.logbook.path = absolutize(root, &self.logbook.path);
        self.logbook.actions = absolutize(root, &self.logbook.actions);
        self.logbook.repairs = absolutize(root, &self.logbook.repairs);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
    #[serde(default = "SystemConfig::default_version")]
    pub version: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "uplink".to_string()
    }

    fn default_version() -> String {
        "0.1.0".to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "StoreConfig::default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("db/uplink.db")
    }

    fn default_busy_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
            busy_timeout_ms: Self::default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyConfig {
    /// Deepest permitted sponsor chain, counted in ancestors above a partner.
    #[serde(default = "HierarchyConfig::default_max_levels")]
    pub max_levels: u32,
}

impl HierarchyConfig {
    pub const DEFAULT_MAX_LEVELS: u32 = 10;

    fn default_max_levels() -> u32 {
        Self::DEFAULT_MAX_LEVELS
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_levels: Self::default_max_levels(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommissionConfig {
    #[serde(default = "CommissionConfig::default_schedules_path")]
    pub schedules_path: PathBuf,
    #[serde(default = "CommissionConfig::default_schedule")]
    pub schedule: String,
    /// Restore a locally edited schedule to its embedded canonical copy.
    #[serde(default = "CommissionConfig::default_locked")]
    pub locked: bool,
}

impl CommissionConfig {
    fn default_schedules_path() -> PathBuf {
        PathBuf::from("schedules")
    }

    fn default_schedule() -> String {
        payplan::assets::STANDARD_TOML_NAME.to_string()
    }

    fn default_locked() -> bool {
        true
    }
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            schedules_path: Self::default_schedules_path(),
            schedule: Self::default_schedule(),
            locked: Self::default_locked(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_path")]
    pub path: PathBuf,
    #[serde(default = "LogbookConfig::default_actions")]
    pub actions: PathBuf,
    #[serde(default = "LogbookConfig::default_repairs")]
    pub repairs: PathBuf,
}

impl LogbookConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("logbook")
    }

    fn default_actions() -> PathBuf {
        PathBuf::from("logbook/actions.jsonl")
    }

    fn default_repairs() -> PathBuf {
        PathBuf::from("logbook/repairs.jsonl")
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            actions: Self::default_actions(),
            repairs: Self::default_repairs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "ServicesConfig::default_true")]
    pub audit_enabled: bool,
}

impl ServicesConfig {
    fn default_true() -> bool {
        true
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self { audit_enabled: true }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}
