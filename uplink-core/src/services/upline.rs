// src/services/upline.rs
//! Upline Resolver: ordered ancestors of a partner.
//!
//! The closure table is the primary source. Walking `sponsor_id` pointers is the
//! diagnostic fallback used by the cycle guard and the reconciliation job.

use rusqlite::Connection;
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::model::UplineEntry;
use crate::services::store;

/// Ancestors of `partner_id` from the closure table, level 1 first, at most `max_levels`.
///
/// Rows that do not form the sequence 1, 2, .. n with distinct ancestors, or whose
/// level-1 row disagrees with the sponsor pointer, are drift: the resolver refuses
/// to answer rather than hand a corrupted chain to a payout.
pub fn resolve_upline(conn: &Connection, partner_id: &str, max_levels: u32) -> EngineResult<Vec<UplineEntry>> {
    let sponsor = store::sponsor_of(conn, partner_id)?
        .ok_or_else(|| EngineError::PartnerNotFound(partner_id.to_string()))?;

    let mut stmt = conn.prepare_cached(
        "SELECT ancestor_id, level FROM hierarchy_edges
         WHERE child_id = ?1 AND level <= ?2
         ORDER BY level",
    )?;
    let rows = stmt.query_map(rusqlite::params![partner_id, max_levels], |r| {
        Ok(UplineEntry {
            ancestor_id: r.get(0)?,
            level: r.get(1)?,
        })
    })?;

    let drift = |detail: String| EngineError::ReconciliationDriftDetected {
        partner_id: partner_id.to_string(),
        detail,
    };

    let mut seen = HashSet::new();
    let mut upline = Vec::new();
    for (idx, row) in rows.enumerate() {
        let entry = row?;
        let expected_level = idx as u32 + 1;
        if entry.level != expected_level {
            return Err(drift(format!("expected level {expected_level}, found {}", entry.level)));
        }
        if !seen.insert(entry.ancestor_id.clone()) {
            return Err(drift(format!(
                "ancestor {} appears at more than one level",
                entry.ancestor_id
            )));
        }
        upline.push(entry);
    }

    let first = upline.first().map(|e| e.ancestor_id.as_str());
    if max_levels > 0 && first != sponsor.as_deref() {
        return Err(drift(format!(
            "level-1 edge {:?} disagrees with sponsor pointer {:?}",
            first, sponsor
        )));
    }

    Ok(upline)
}

/// Walk `sponsor_id` pointers upward, at most `max_levels` hops.
///
/// Fails with `CircularReferenceDetected` as soon as a partner is seen twice and
/// with `HierarchyTooDeep` when the chain has not ended after `max_levels` hops.
pub fn resolve_upline_by_pointers(
    conn: &Connection,
    partner_id: &str,
    max_levels: u32,
) -> EngineResult<Vec<UplineEntry>> {
    let mut current = store::sponsor_of(conn, partner_id)?
        .ok_or_else(|| EngineError::PartnerNotFound(partner_id.to_string()))?;

    let mut seen: HashSet<String> = HashSet::from([partner_id.to_string()]);
    let mut upline = Vec::new();
    let mut level = 0u32;

    while let Some(ancestor_id) = current {
        level += 1;
        if !seen.insert(ancestor_id.clone()) {
            return Err(EngineError::CircularReferenceDetected {
                start_id: partner_id.to_string(),
                partner_id: ancestor_id,
            });
        }
        if level > max_levels {
            return Err(EngineError::HierarchyTooDeep {
                depth: level,
                max_levels,
            });
        }
        current = store::sponsor_of(conn, &ancestor_id)?
            .ok_or_else(|| EngineError::PartnerNotFound(ancestor_id.clone()))?;
        upline.push(UplineEntry { ancestor_id, level });
    }

    Ok(upline)
}
