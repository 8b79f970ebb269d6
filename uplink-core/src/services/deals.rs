// src/services/deals.rs
//! Minimal deal book: what the distributor needs to know about a deal.

use chrono::Utc;
use payplan::ScheduleError;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::{Deal, DealStatus, NewDeal};
use crate::services::store;

pub fn submit_deal(conn: &Connection, deal: &NewDeal) -> EngineResult<Deal> {
    if deal.value_pence < 0 {
        return Err(ScheduleError::NegativeValue(deal.value_pence).into());
    }
    if store::get_partner(conn, &deal.submitting_partner_id)?.is_none() {
        return Err(EngineError::PartnerNotFound(deal.submitting_partner_id.clone()));
    }

    let deal_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO deals(deal_id, submitting_partner_id, value_pence, category, locations, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            deal_id,
            deal.submitting_partner_id,
            deal.value_pence,
            deal.category.as_str(),
            deal.locations.max(1),
            DealStatus::Submitted.as_str(),
            now,
        ],
    )?;
    store::get_deal(conn, &deal_id)?.ok_or(EngineError::DealNotFound(deal_id))
}

pub fn set_deal_status(conn: &Connection, deal_id: &str, status: DealStatus) -> EngineResult<Deal> {
    let changed = conn.execute(
        "UPDATE deals SET status = ?1, updated_at = ?2 WHERE deal_id = ?3",
        params![status.as_str(), Utc::now().to_rfc3339(), deal_id],
    )?;
    if changed == 0 {
        return Err(EngineError::DealNotFound(deal_id.to_string()));
    }
    store::get_deal(conn, deal_id)?.ok_or_else(|| EngineError::DealNotFound(deal_id.to_string()))
}
