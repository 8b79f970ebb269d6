// src/services/guard.rs
//! Cycle Guard. Read-only; must pass before any write that sets a sponsor.

use rusqlite::Connection;

use crate::error::{EngineError, EngineResult};
use crate::services::{store, upline};

/// Whether `child_id` may be placed directly under `proposed_sponsor_id`.
///
/// False when the child is the sponsor itself, already sits in the sponsor's
/// ancestor chain, or the chain does not end within `max_levels` hops.
pub fn can_link(
    conn: &Connection,
    child_id: &str,
    proposed_sponsor_id: &str,
    max_levels: u32,
) -> EngineResult<bool> {
    if child_id == proposed_sponsor_id {
        return Ok(false);
    }

    let edges = store::edges_for_child(conn, proposed_sponsor_id)?;
    if !edges.is_empty() {
        let contains_child = edges.iter().any(|e| e.ancestor_id == child_id);
        let overflows = edges.iter().any(|e| e.level > max_levels);
        return Ok(!contains_child && !overflows);
    }

    // No closure rows: either a root or rows never written. Fall back to pointers.
    match upline::resolve_upline_by_pointers(conn, proposed_sponsor_id, max_levels) {
        Ok(chain) => Ok(!chain.iter().any(|e| e.ancestor_id == child_id)),
        Err(EngineError::CircularReferenceDetected { .. }) | Err(EngineError::HierarchyTooDeep { .. }) => {
            tracing::warn!(
                sponsor = proposed_sponsor_id,
                "sponsor chain does not terminate; refusing link"
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
