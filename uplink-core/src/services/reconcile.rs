// src/services/reconcile.rs
//! Reconciliation Job: diff the sponsor-pointer chain against the closure rows.
//!
//! Detection (`audit_partner`, `sweep`) never writes. `apply_repair` executes a
//! reviewed plan and refuses plans that no longer match the data.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::model::{PartnerId, UplineEntry};
use crate::services::{store, upline};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub partner_id: PartnerId,
    /// Chain derived from `sponsor_id` pointers; what the closure rows should say.
    pub expected: Vec<UplineEntry>,
    pub to_delete: Vec<UplineEntry>,
    pub to_insert: Vec<UplineEntry>,
}

impl RepairPlan {
    pub fn is_clean(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub audited: usize,
    pub drifted: Vec<RepairPlan>,
    /// Partners whose pointer chain could not be walked (cycle, too deep, dangling).
    pub failures: Vec<(PartnerId, String)>,
}

pub fn audit_partner(conn: &Connection, partner_id: &str, max_levels: u32) -> EngineResult<RepairPlan> {
    let expected = upline::resolve_upline_by_pointers(conn, partner_id, max_levels)?;
    let actual: Vec<UplineEntry> = store::edges_for_child(conn, partner_id)?
        .into_iter()
        .map(|e| UplineEntry {
            ancestor_id: e.ancestor_id,
            level: e.level,
        })
        .collect();

    let expected_set: HashSet<&UplineEntry> = expected.iter().collect();
    let actual_set: HashSet<&UplineEntry> = actual.iter().collect();

    let to_delete: Vec<UplineEntry> = actual
        .iter()
        .filter(|e| !expected_set.contains(e))
        .cloned()
        .collect();
    let to_insert: Vec<UplineEntry> = expected
        .iter()
        .filter(|e| !actual_set.contains(e))
        .cloned()
        .collect();

    let plan = RepairPlan {
        partner_id: partner_id.to_string(),
        expected,
        to_delete,
        to_insert,
    };
    if !plan.is_clean() {
        tracing::warn!(
            partner = partner_id,
            delete = plan.to_delete.len(),
            insert = plan.to_insert.len(),
            "closure drift detected"
        );
    }
    Ok(plan)
}

/// Execute a plan produced by `audit_partner`, inside the caller's transaction.
pub fn apply_repair(conn: &Connection, plan: &RepairPlan, max_levels: u32) -> EngineResult<RepairOutcome> {
    let current = audit_partner(conn, &plan.partner_id, max_levels)?;
    if current != *plan {
        return Err(EngineError::ReconciliationDriftDetected {
            partner_id: plan.partner_id.clone(),
            detail: "repair plan is stale; audit again before applying".into(),
        });
    }

    let mut deleted = 0;
    for e in &plan.to_delete {
        deleted += store::delete_edge(conn, &plan.partner_id, &e.ancestor_id, e.level)?;
    }
    let now = Utc::now().to_rfc3339();
    for e in &plan.to_insert {
        store::insert_edge(conn, &plan.partner_id, &e.ancestor_id, e.level, &now)?;
    }

    tracing::info!(partner = %plan.partner_id, deleted, inserted = plan.to_insert.len(), "repair applied");
    Ok(RepairOutcome {
        deleted,
        inserted: plan.to_insert.len(),
    })
}

/// Audit every partner. Never repairs.
pub fn sweep(conn: &Connection, max_levels: u32) -> EngineResult<SweepReport> {
    let mut report = SweepReport::default();
    for partner_id in store::all_partner_ids(conn)? {
        report.audited += 1;
        match audit_partner(conn, &partner_id, max_levels) {
            Ok(plan) if plan.is_clean() => {}
            Ok(plan) => report.drifted.push(plan),
            Err(e @ EngineError::Storage(_)) => return Err(e),
            Err(e) => report.failures.push((partner_id, e.to_string())),
        }
    }
    Ok(report)
}
