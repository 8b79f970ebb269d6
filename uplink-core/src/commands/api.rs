// src/commands/api.rs
use anyhow::{Context, Result};
use payplan::Schedule;
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use crate::commands::init::ensure_initialized_once;
use crate::config::{CoreConfig, HierarchyConfig};
use crate::error::EngineResult;
use crate::model::{Deal, DealStatus, EntryKind, LedgerEntry, NewDeal, NewPartner, Partner, UplineEntry};
use crate::services::audit::AuditLog;
use crate::services::distributor::{self, Distribution};
use crate::services::reconcile::{self, RepairOutcome, RepairPlan, SweepReport};
use crate::services::stats::{self, PartnerStats};
use crate::services::store::{self, Store};
use crate::services::{deals, guard, registry, upline};

/// Everything an engine needs besides its database.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_levels: u32,
    pub schedule: Schedule,
    pub audit: AuditLog,
    pub busy_timeout: Duration,
}

impl EngineSettings {
    /// Ten levels, the embedded standard schedule, no audit files.
    pub fn standard() -> Result<Self> {
        Ok(Self {
            max_levels: HierarchyConfig::DEFAULT_MAX_LEVELS,
            schedule: payplan::standard_schedule().context("embedded standard schedule")?,
            audit: AuditLog::disabled(),
            busy_timeout: Duration::from_secs(5),
        })
    }

    pub fn from_config(cfg: &CoreConfig) -> Result<Self> {
        let name = &cfg.commission.schedule;
        let path = cfg.commission.schedules_path.join(name);
        let text = payplan::assets::read_verified_or_embedded(&path, name, cfg.commission.locked)?;
        let schedule = payplan::parse_schedule(&text).with_context(|| format!("schedule {:?}", path))?;
        Ok(Self {
            max_levels: cfg.hierarchy.max_levels,
            schedule,
            audit: AuditLog::from_config(cfg),
            busy_timeout: Duration::from_millis(cfg.store.busy_timeout_ms),
        })
    }
}

/// Facade over the store and services. One SQLite connection per engine;
/// open one engine per thread to work concurrently on the same file.
pub struct Engine {
    store: Store,
    settings: EngineSettings,
}

impl Engine {
    /// Open against the initialized root (`$UPLINK_ROOT` or `./.uplink`).
    pub fn open_default() -> Result<Self> {
        let report = ensure_initialized_once()?;
        Self::open(&report.config)
    }

    pub fn open(cfg: &CoreConfig) -> Result<Self> {
        let settings = EngineSettings::from_config(cfg)?;
        Self::open_at(&cfg.store.db_path, settings)
    }

    /// Construct an engine bound to a specific SQLite path (primarily for tests/tools).
    pub fn open_at(db_path: impl AsRef<Path>, settings: EngineSettings) -> Result<Self> {
        let store = Store::open(db_path.as_ref(), settings.busy_timeout)?;
        Ok(Self { store, settings })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction; an error rolls everything back.
    fn write<T>(&mut self, f: impl FnOnce(&Connection, &EngineSettings) -> EngineResult<T>) -> EngineResult<T> {
        let tx = self.store.begin()?;
        let out = f(&tx, &self.settings)?;
        tx.commit()?;
        Ok(out)
    }

    fn read(&self) -> &Connection {
        self.store.conn()
    }

    // ---------- partners ----------

    /// Signup entry point. Fails with `SponsorNotFound`, `SponsorInactive`,
    /// `CycleDetected` or `HierarchyTooDeep` before anything is written.
    pub fn register_partner(&mut self, sponsor_code: Option<&str>, profile: &NewPartner) -> EngineResult<Partner> {
        let result = self.write(|conn, s| registry::register_partner(conn, sponsor_code, profile, s.max_levels));
        match &result {
            Ok(p) => self.settings.audit.record_action(
                "registry",
                "partner_registered",
                &json!({"partner_id": p.partner_id, "partner_code": p.partner_code, "sponsor_id": p.sponsor_id}),
                "low",
            ),
            Err(e) => self.settings.audit.record_action(
                "registry",
                "registration_rejected",
                &json!({"sponsor_code": sponsor_code, "reason": e.to_string()}),
                "medium",
            ),
        }
        result
    }

    /// Link a partner registered without a sponsor. Returns the number of closure rows added.
    pub fn attach_sponsor(&mut self, partner_id: &str, sponsor_code: &str) -> EngineResult<usize> {
        let result = self.write(|conn, s| registry::attach_sponsor(conn, partner_id, sponsor_code, s.max_levels));
        let (action, severity, details) = match &result {
            Ok(edges) => ("sponsor_attached", "low", json!({"partner_id": partner_id, "sponsor_code": sponsor_code, "edges": edges})),
            Err(e) => ("attach_rejected", "medium", json!({"partner_id": partner_id, "sponsor_code": sponsor_code, "reason": e.to_string()})),
        };
        self.settings.audit.record_action("registry", action, &details, severity);
        result
    }

    pub fn deactivate_partner(&mut self, partner_id: &str) -> EngineResult<bool> {
        let changed = self.write(|conn, _| registry::deactivate_partner(conn, partner_id))?;
        if changed {
            self.settings
                .audit
                .record_action("registry", "partner_deactivated", &json!({"partner_id": partner_id}), "low");
        }
        Ok(changed)
    }

    pub fn partner(&self, partner_id: &str) -> EngineResult<Option<Partner>> {
        store::get_partner(self.read(), partner_id)
    }

    pub fn partner_by_code(&self, code: &str) -> EngineResult<Option<Partner>> {
        store::find_partner_by_code(self.read(), code)
    }

    // ---------- hierarchy reads ----------

    pub fn can_link(&self, child_id: &str, proposed_sponsor_id: &str) -> EngineResult<bool> {
        guard::can_link(self.read(), child_id, proposed_sponsor_id, self.settings.max_levels)
    }

    pub fn resolve_upline(&self, partner_id: &str, max_levels: u32) -> EngineResult<Vec<UplineEntry>> {
        upline::resolve_upline(self.read(), partner_id, max_levels)
    }

    /// Diagnostic walk over `sponsor_id` pointers.
    pub fn resolve_upline_by_pointers(&self, partner_id: &str, max_levels: u32) -> EngineResult<Vec<UplineEntry>> {
        upline::resolve_upline_by_pointers(self.read(), partner_id, max_levels)
    }

    pub fn descendants(&self, partner_id: &str) -> EngineResult<Vec<(String, u32)>> {
        store::descendants_of(self.read(), partner_id)
    }

    // ---------- deals + commission ----------

    pub fn submit_deal(&mut self, deal: &NewDeal) -> EngineResult<Deal> {
        let deal = self.write(|conn, _| deals::submit_deal(conn, deal))?;
        self.settings.audit.record_action(
            "deals",
            "deal_submitted",
            &json!({"deal_id": deal.deal_id, "partner_id": deal.submitting_partner_id, "category": deal.category, "value_pence": deal.value_pence}),
            "low",
        );
        Ok(deal)
    }

    pub fn set_deal_status(&mut self, deal_id: &str, status: DealStatus) -> EngineResult<Deal> {
        let deal = self.write(|conn, _| deals::set_deal_status(conn, deal_id, status))?;
        self.settings
            .audit
            .record_action("deals", "deal_status_changed", &json!({"deal_id": deal_id, "status": status}), "low");
        Ok(deal)
    }

    pub fn deal(&self, deal_id: &str) -> EngineResult<Option<Deal>> {
        store::get_deal(self.read(), deal_id)
    }

    pub fn ledger_for_deal(&self, deal_id: &str) -> EngineResult<Vec<LedgerEntry>> {
        store::ledger_for_deal(self.read(), deal_id)
    }

    /// Full distribution report: pool breakdown, rows, what was left unpaid.
    pub fn distribute(&mut self, deal_id: &str) -> EngineResult<Distribution> {
        let result = self.write(|conn, s| distributor::distribute(conn, deal_id, &s.schedule, s.max_levels));
        match &result {
            Ok(d) if d.newly_written > 0 => self.settings.audit.record_action(
                "distributor",
                "commission_distributed",
                &json!({"deal_id": deal_id, "pool_pence": d.pool.total_pool_pence, "rows": d.newly_written, "unclaimed_pence": d.unclaimed_pence}),
                "low",
            ),
            Ok(_) => {}
            Err(e) => self.settings.audit.record_action(
                "distributor",
                "distribution_failed",
                &json!({"deal_id": deal_id, "reason": e.to_string()}),
                "high",
            ),
        }
        result
    }

    /// Collaborator entry point; idempotent and safe to retry.
    pub fn distribute_commission(&mut self, deal_id: &str) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.distribute(deal_id)?.entries)
    }

    // ---------- dashboards ----------

    pub fn get_team_size(&self, partner_id: &str) -> EngineResult<u64> {
        stats::team_size(self.read(), partner_id)
    }

    pub fn get_direct_revenue(&self, partner_id: &str) -> EngineResult<i64> {
        stats::revenue(self.read(), partner_id, EntryKind::Direct)
    }

    pub fn get_override_revenue(&self, partner_id: &str) -> EngineResult<i64> {
        stats::revenue(self.read(), partner_id, EntryKind::Override)
    }

    pub fn partner_stats(&self, partner_id: &str) -> EngineResult<PartnerStats> {
        stats::partner_stats(self.read(), partner_id)
    }

    // ---------- reconciliation ----------

    pub fn audit_partner(&self, partner_id: &str) -> EngineResult<RepairPlan> {
        reconcile::audit_partner(self.read(), partner_id, self.settings.max_levels)
    }

    pub fn apply_repair(&mut self, plan: &RepairPlan) -> EngineResult<RepairOutcome> {
        let outcome = self.write(|conn, s| reconcile::apply_repair(conn, plan, s.max_levels))?;
        self.settings.audit.record_repair(plan);
        Ok(outcome)
    }

    pub fn sweep(&self) -> EngineResult<SweepReport> {
        let report = reconcile::sweep(self.read(), self.settings.max_levels)?;
        if !report.drifted.is_empty() || !report.failures.is_empty() {
            self.settings.audit.record_action(
                "reconcile",
                "sweep_found_drift",
                &json!({"audited": report.audited, "drifted": report.drifted.len(), "failures": report.failures.len()}),
                "high",
            );
        }
        Ok(report)
    }
}
