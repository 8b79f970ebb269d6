// src/services/registry.rs
//! Partner registry: the only code that writes `sponsor_id` or closure edges
//! outside of reconciliation repairs.
//!
//! Callers hand in an open `BEGIN IMMEDIATE` transaction; nothing here commits.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::{NewPartner, Partner, UplineEntry};
use crate::services::{guard, store, upline};

const CODE_PREFIX: &str = "UP-";
const CODE_ATTEMPTS: usize = 8;

/// Create a partner, optionally under the sponsor holding `sponsor_code`.
///
/// The partner row and one closure edge per ancestor are written together; any
/// rejection happens before the first write.
pub fn register_partner(
    conn: &Connection,
    sponsor_code: Option<&str>,
    profile: &NewPartner,
    max_levels: u32,
) -> EngineResult<Partner> {
    let partner_id = Uuid::new_v4().to_string();

    let mut edges: Vec<UplineEntry> = Vec::new();
    if let Some(code) = sponsor_code {
        let sponsor = active_sponsor(conn, code)?;
        // Depth first: a sponsor already at the limit is too deep, not a cycle.
        let sponsor_upline = upline::resolve_upline(conn, &sponsor.partner_id, max_levels)?;
        let depth = sponsor_upline.len() as u32 + 1;
        if depth > max_levels {
            return Err(EngineError::HierarchyTooDeep { depth, max_levels });
        }
        if !guard::can_link(conn, &partner_id, &sponsor.partner_id, max_levels)? {
            return Err(EngineError::CycleDetected {
                child_id: partner_id,
                sponsor_id: sponsor.partner_id,
            });
        }
        edges.push(UplineEntry {
            ancestor_id: sponsor.partner_id.clone(),
            level: 1,
        });
        edges.extend(sponsor_upline.into_iter().map(|e| UplineEntry {
            ancestor_id: e.ancestor_id,
            level: e.level + 1,
        }));
    }

    let now = Utc::now().to_rfc3339();
    let code = unused_partner_code(conn)?;
    let sponsor_id = edges.first().map(|e| e.ancestor_id.as_str());
    conn.execute(
        "INSERT INTO partners(partner_id, partner_code, sponsor_id, name, email, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![partner_id, code, sponsor_id, profile.name, profile.email, now],
    )?;
    for edge in &edges {
        store::insert_edge(conn, &partner_id, &edge.ancestor_id, edge.level, &now)?;
    }

    tracing::info!(
        partner = %partner_id,
        sponsor = ?sponsor_id,
        depth = edges.len(),
        "partner registered"
    );
    store::get_partner(conn, &partner_id)?.ok_or(EngineError::PartnerNotFound(partner_id))
}

/// Link an unsponsored partner (and its whole subtree) under a sponsor.
///
/// Returns how many closure edges were added.
pub fn attach_sponsor(
    conn: &Connection,
    partner_id: &str,
    sponsor_code: &str,
    max_levels: u32,
) -> EngineResult<usize> {
    let partner = store::get_partner(conn, partner_id)?
        .ok_or_else(|| EngineError::PartnerNotFound(partner_id.to_string()))?;
    if partner.sponsor_id.is_some() {
        return Err(EngineError::AlreadySponsored(partner.partner_id));
    }
    let sponsor = active_sponsor(conn, sponsor_code)?;

    let sponsor_upline = upline::resolve_upline(conn, &sponsor.partner_id, max_levels)?;
    let subtree = store::descendants_of(conn, partner_id)?;
    let deepest = subtree.iter().map(|(_, level)| *level).max().unwrap_or(0);
    let depth = deepest + 1 + sponsor_upline.len() as u32;
    if depth > max_levels {
        return Err(EngineError::HierarchyTooDeep { depth, max_levels });
    }

    if !guard::can_link(conn, partner_id, &sponsor.partner_id, max_levels)? {
        tracing::warn!(partner = partner_id, sponsor = %sponsor.partner_id, "link rejected by cycle guard");
        return Err(EngineError::CycleDetected {
            child_id: partner_id.to_string(),
            sponsor_id: sponsor.partner_id,
        });
    }

    let updated = conn.execute(
        "UPDATE partners SET sponsor_id = ?1 WHERE partner_id = ?2 AND sponsor_id IS NULL",
        params![sponsor.partner_id, partner_id],
    )?;
    if updated != 1 {
        return Err(EngineError::AlreadySponsored(partner_id.to_string()));
    }

    // Graft: every node of the subtree gains the sponsor and its upline, shifted
    // by the node's distance to the attached partner.
    let now = Utc::now().to_rfc3339();
    let mut added = 0;
    let nodes = std::iter::once((partner_id.to_string(), 0u32)).chain(subtree);
    for (node, distance) in nodes {
        store::insert_edge(conn, &node, &sponsor.partner_id, distance + 1, &now)?;
        added += 1;
        for anc in &sponsor_upline {
            store::insert_edge(conn, &node, &anc.ancestor_id, distance + 1 + anc.level, &now)?;
            added += 1;
        }
    }

    tracing::info!(partner = partner_id, sponsor = %sponsor.partner_id, edges = added, "sponsor attached");
    Ok(added)
}

/// Soft-delete. Rows and edges stay so commission history remains traceable.
/// Returns false when the partner was already inactive.
pub fn deactivate_partner(conn: &Connection, partner_id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE partners SET active = 0, deactivated_at = ?1 WHERE partner_id = ?2 AND active = 1",
        params![Utc::now().to_rfc3339(), partner_id],
    )?;
    if changed == 0 && store::get_partner(conn, partner_id)?.is_none() {
        return Err(EngineError::PartnerNotFound(partner_id.to_string()));
    }
    Ok(changed == 1)
}

fn active_sponsor(conn: &Connection, code: &str) -> EngineResult<Partner> {
    let sponsor = store::find_partner_by_code(conn, code.trim())?
        .ok_or_else(|| EngineError::SponsorNotFound(code.to_string()))?;
    if !sponsor.active {
        return Err(EngineError::SponsorInactive(sponsor.partner_id));
    }
    Ok(sponsor)
}

fn unused_partner_code(conn: &Connection) -> EngineResult<String> {
    let mut code = new_partner_code();
    for _ in 1..CODE_ATTEMPTS {
        if store::find_partner_by_code(conn, &code)?.is_none() {
            break;
        }
        code = new_partner_code();
    }
    // A collision surviving every attempt surfaces as a UNIQUE violation on insert.
    Ok(code)
}

fn new_partner_code() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("{CODE_PREFIX}{}", &raw[..8])
}
