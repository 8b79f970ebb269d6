//! services/audit.rs
//! Append-only JSONL audit trail for engine actions and applied repairs.
//!
//! - One JSON object per line under `<root>/logbook/`.
//! - Writes are best effort: a failed append never fails the engine operation.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::CoreConfig;

#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    paths: Option<LogPaths>,
}

#[derive(Debug, Clone)]
struct LogPaths {
    actions: PathBuf,
    repairs: PathBuf,
}

impl AuditLog {
    /// An audit log that drops every record (tests, tools).
    pub fn disabled() -> Self {
        Self { paths: None }
    }

    pub fn from_config(cfg: &CoreConfig) -> Self {
        if !cfg.services.audit_enabled {
            return Self::disabled();
        }
        Self {
            paths: Some(LogPaths {
                actions: cfg.logbook.actions.clone(),
                repairs: cfg.logbook.repairs.clone(),
            }),
        }
    }

    /// Record a generic action event.
    ///
    /// # Arguments
    /// * `agent`: Component name (e.g., `"registry"`, `"distributor"`).
    /// * `action`: Short verb label (e.g., `"partner_registered"`).
    /// * `details`: Arbitrary JSON payload (ids, amounts, reasons).
    /// * `severity`: `"low" | "medium" | "high"` for quick triage.
    pub fn record_action(&self, agent: &str, action: &str, details: &Value, severity: &str) {
        let Some(paths) = &self.paths else { return };
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": "action",
            "agent": agent,
            "action": action,
            "severity": severity,
            "details": details
        });
        append_jsonl(&paths.actions, &entry);
    }

    /// Record a repair plan that has just been applied.
    pub fn record_repair<S: Serialize>(&self, plan: &S) {
        let Some(paths) = &self.paths else { return };
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": "repair_applied",
            "plan": plan,
        });
        append_jsonl(&paths.repairs, &entry);
    }
}

/// Append a single JSON value as a line to a JSONL file, creating parents as needed.
fn append_jsonl<S: Serialize>(path: &Path, val: &S) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let line = match serde_json::to_string(val) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("audit record not serializable: {e}");
            return;
        }
    };
    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut f) => {
            if let Err(e) = writeln!(f, "{line}") {
                tracing::warn!("audit append to {} failed: {e}", path.display());
            }
        }
        Err(e) => tracing::warn!("audit open {} failed: {e}", path.display()),
    }
}
