// src/services/stats.rs
//! Dashboard aggregates, recomputed from closure rows and the ledger on every call.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::model::{EntryKind, PartnerId};
use crate::services::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerStats {
    pub partner_id: PartnerId,
    pub team_size: u64,
    pub direct_recruits: u64,
    pub direct_revenue_pence: i64,
    pub override_revenue_pence: i64,
}

/// Everyone below the partner, at any depth.
pub fn team_size(conn: &Connection, partner_id: &str) -> EngineResult<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM hierarchy_edges WHERE ancestor_id = ?1",
        [partner_id],
        |r| r.get(0),
    )?;
    Ok(n as u64)
}

pub fn direct_recruits(conn: &Connection, partner_id: &str) -> EngineResult<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM hierarchy_edges WHERE ancestor_id = ?1 AND level = 1",
        [partner_id],
        |r| r.get(0),
    )?;
    Ok(n as u64)
}

pub fn revenue(conn: &Connection, partner_id: &str, kind: EntryKind) -> EngineResult<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_pence), 0) FROM ledger_entries
         WHERE payee_partner_id = ?1 AND kind = ?2",
        [partner_id, kind.as_str()],
        |r| r.get(0),
    )?;
    Ok(total)
}

pub fn partner_stats(conn: &Connection, partner_id: &str) -> EngineResult<PartnerStats> {
    if store::get_partner(conn, partner_id)?.is_none() {
        return Err(EngineError::PartnerNotFound(partner_id.to_string()));
    }
    Ok(PartnerStats {
        partner_id: partner_id.to_string(),
        team_size: team_size(conn, partner_id)?,
        direct_recruits: direct_recruits(conn, partner_id)?,
        direct_revenue_pence: revenue(conn, partner_id, EntryKind::Direct)?,
        override_revenue_pence: revenue(conn, partner_id, EntryKind::Override)?,
    })
}
