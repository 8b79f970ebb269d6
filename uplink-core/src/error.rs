//! Error taxonomy for engine operations.

use payplan::ScheduleError;
use thiserror::Error;

use crate::model::{DealId, DealStatus, PartnerId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("sponsor not found: {0}")]
    SponsorNotFound(String),

    #[error("sponsor {0} is deactivated and cannot recruit")]
    SponsorInactive(PartnerId),

    #[error("linking {child_id} under {sponsor_id} would create a cycle")]
    CycleDetected {
        child_id: PartnerId,
        sponsor_id: PartnerId,
    },

    #[error("hierarchy too deep: {depth} levels exceeds the limit of {max_levels}")]
    HierarchyTooDeep { depth: u32, max_levels: u32 },

    #[error("circular sponsor reference at {partner_id} while walking from {start_id}")]
    CircularReferenceDetected {
        start_id: PartnerId,
        partner_id: PartnerId,
    },

    #[error("partner not found: {0}")]
    PartnerNotFound(PartnerId),

    #[error("partner {0} already has a sponsor")]
    AlreadySponsored(PartnerId),

    #[error("deal not found: {0}")]
    DealNotFound(DealId),

    #[error("deal {deal_id} is {status} and not eligible for commission")]
    DealNotEligible { deal_id: DealId, status: DealStatus },

    #[error("ledger for deal {deal_id} would pay {paid_pence}p out of a {pool_pence}p pool")]
    PoolExceeded {
        deal_id: DealId,
        paid_pence: i64,
        pool_pence: i64,
    },

    #[error("closure rows for {partner_id} drifted from the sponsor chain: {detail}")]
    ReconciliationDriftDetected { partner_id: PartnerId, detail: String },

    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
