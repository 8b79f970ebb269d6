// src/services/distributor.rs
//! Commission Distributor: pool → upline → ledger rows, inside the caller's transaction.

use chrono::Utc;
use payplan::{compute_pool, DealInput, PoolBreakdown, Schedule};
use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::{DealId, EntryKind, LedgerEntry};
use crate::services::{store, upline};

#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    pub deal_id: DealId,
    pub pool: PoolBreakdown,
    /// Every ledger row for the deal after this run, level order.
    pub entries: Vec<LedgerEntry>,
    /// Rows inserted by this run; 0 when the deal had already been paid.
    pub newly_written: usize,
    /// Pool left unpaid: missing ancestors, inactive payees, rounding.
    pub unclaimed_pence: i64,
}

/// Pay out a completed deal. Re-running for a paid deal returns the existing rows.
pub fn distribute(
    conn: &Connection,
    deal_id: &str,
    schedule: &Schedule,
    max_levels: u32,
) -> EngineResult<Distribution> {
    let deal = store::get_deal(conn, deal_id)?
        .ok_or_else(|| EngineError::DealNotFound(deal_id.to_string()))?;
    if !deal.status.is_commission_eligible() {
        return Err(EngineError::DealNotEligible {
            deal_id: deal.deal_id,
            status: deal.status,
        });
    }

    let pool = compute_pool(
        &DealInput {
            value_pence: deal.value_pence,
            category: deal.category,
            locations: deal.locations,
        },
        schedule,
    )?;

    let existing = store::ledger_for_deal(conn, deal_id)?;
    if !existing.is_empty() {
        tracing::debug!(deal = deal_id, rows = existing.len(), "deal already paid; distribution is a no-op");
        return Ok(finish(deal.deal_id, pool, existing, 0));
    }

    let depth = schedule.split.max_override_depth.min(max_levels);
    let ancestors = upline::resolve_upline(conn, &deal.submitting_partner_id, depth)?;
    let payees = std::iter::once((deal.submitting_partner_id.clone(), 0u32))
        .chain(ancestors.into_iter().map(|e| (e.ancestor_id, e.level)));

    let now = Utc::now().to_rfc3339();
    let mut written = 0;
    for (payee_id, level) in payees {
        let amount = pool.amount_for_level(level);
        if amount == 0 {
            continue;
        }
        let payee = store::get_partner(conn, &payee_id)?
            .ok_or_else(|| EngineError::PartnerNotFound(payee_id.clone()))?;
        if !payee.active {
            tracing::info!(deal = deal_id, payee = %payee_id, level, "payee inactive; share left unpaid");
            continue;
        }
        let inserted = conn.execute(
            "INSERT INTO ledger_entries(entry_id, deal_id, payee_partner_id, level, amount_pence, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(deal_id, payee_partner_id, level) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                deal_id,
                payee_id,
                level,
                amount,
                EntryKind::for_level(level).as_str(),
                now,
            ],
        )?;
        if inserted == 0 {
            tracing::debug!(deal = deal_id, payee = %payee_id, level, "duplicate ledger entry absorbed");
        }
        written += inserted;
    }

    let entries = store::ledger_for_deal(conn, deal_id)?;
    let paid: i64 = entries.iter().map(|e| e.amount_pence).sum();
    if paid > pool.total_pool_pence {
        return Err(EngineError::PoolExceeded {
            deal_id: deal.deal_id,
            paid_pence: paid,
            pool_pence: pool.total_pool_pence,
        });
    }

    tracing::info!(deal = deal_id, pool = pool.total_pool_pence, paid, rows = written, "commission distributed");
    Ok(finish(deal.deal_id, pool, entries, written))
}

fn finish(deal_id: DealId, pool: PoolBreakdown, entries: Vec<LedgerEntry>, newly_written: usize) -> Distribution {
    let paid: i64 = entries.iter().map(|e| e.amount_pence).sum();
    Distribution {
        deal_id,
        unclaimed_pence: pool.total_pool_pence - paid,
        pool,
        entries,
        newly_written,
    }
}
