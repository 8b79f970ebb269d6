// uplink-core/src/commands/init.rs

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::CoreConfig;

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
    pub config: CoreConfig,
}

// ---------- single global init gate ----------

static INIT: OnceCell<InitReport> = OnceCell::new();

/// Idempotent global initializer. Safe to call often.
pub fn ensure_initialized_once() -> Result<&'static InitReport> {
    INIT.get_or_try_init(ensure_initialized)
}

/// Resolve the uplink root. Allow override via UPLINK_ROOT (tests/ops).
pub fn uplink_root() -> PathBuf {
    std::env::var_os("UPLINK_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".uplink"))
}

/// Ensure the default root is initialized (idempotent).
pub fn ensure_initialized() -> Result<InitReport> {
    ensure_initialized_at(&uplink_root())
}

/// Lay out `root`: directories, `config.toml`, the default schedule, logbook files.
pub fn ensure_initialized_at(root: &Path) -> Result<InitReport> {
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir(root, "", &mut created, &mut existed)?;
    ensure_dir(root, "db", &mut created, &mut existed)?;
    ensure_dir(root, "schedules", &mut created, &mut existed)?;
    ensure_dir(root, "logbook", &mut created, &mut existed)?;

    ensure_file(root, "config.toml", Some(DEFAULT_CONFIG_TOML), &mut created, &mut existed)?;

    let config = CoreConfig::load(root)?;

    for name in payplan::write_default_schedules(&config.commission.schedules_path)? {
        created.push(format!("schedules/{name}"));
    }

    initialize_logbook_files(&config, &mut created, &mut existed)?;

    Ok(InitReport {
        root: root.to_path_buf(),
        created,
        existed,
        config,
    })
}

fn ensure_dir(base: &Path, rel: &str, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    let p = if rel.is_empty() { base.to_path_buf() } else { base.join(rel) };
    let label = if rel.is_empty() { ".".to_string() } else { rel.to_string() };
    if p.exists() {
        existed.push(label);
        return Ok(());
    }
    fs::create_dir_all(&p).with_context(|| format!("create_dir_all({:?})", p))?;
    created.push(label);
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content_if_absent: Option<&str>,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content_if_absent.unwrap_or("").as_bytes())?;
    created.push(rel_file.to_string());
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all({:?})", parent))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open temp file {:?}", tmp))?;
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

fn ensure_seeded_jsonl(path: &Path, init_line: &str, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    let label = path.display().to_string();
    if !path.exists() {
        write_atomic(path, format!("{init_line}\n").as_bytes())?;
        created.push(label);
        return Ok(());
    }
    existed.push(label);
    // If exists but empty, seed it
    if fs::metadata(path)?.len() == 0 {
        let mut f = OpenOptions::new().append(true).open(path)?;
        f.write_all(init_line.as_bytes())?;
        f.write_all(b"\n")?;
    }
    Ok(())
}

fn initialize_logbook_files(cfg: &CoreConfig, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    let init_event = serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "event": "system_init",
        "agent": "system",
        "data": { "name": cfg.system.name, "version": cfg.system.version }
    })
    .to_string();

    ensure_seeded_jsonl(&cfg.logbook.actions, &init_event, created, existed)?;
    ensure_seeded_jsonl(&cfg.logbook.repairs, &init_event, created, existed)?;
    Ok(())
}

// ---------- defaults ----------

const DEFAULT_CONFIG_TOML: &str = r#"[system]
name = "uplink"
version = "0.1.0"

[store]
db_path = "db/uplink.db"
busy_timeout_ms = 5000

[hierarchy]
max_levels = 10

[commission]
schedules_path = "schedules"
schedule = "standard.toml"
locked = true

[logbook]
path = "logbook"
actions = "logbook/actions.jsonl"
repairs = "logbook/repairs.jsonl"

[services]
audit_enabled = true
"#;
