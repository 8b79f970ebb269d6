// src/model.rs
//! Row types shared by the services.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use payplan::ProductCategory;

pub type PartnerId = String;
pub type DealId = String;
pub type EntryId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partner {
    pub partner_id: PartnerId,
    pub partner_code: String,
    /// Denormalized fast pointer; the closure table is authoritative for reads.
    pub sponsor_id: Option<PartnerId>,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub created_at: String,
    pub deactivated_at: Option<String>,
}

/// Profile fields supplied by the signup flow. The engine only stores them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPartner {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyEdge {
    pub child_id: PartnerId,
    pub ancestor_id: PartnerId,
    pub level: u32,
    pub created_at: String,
}

/// One ancestor of a partner; level 1 is the immediate sponsor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UplineEntry {
    pub ancestor_id: PartnerId,
    pub level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Submitted,
    InReview,
    Approved,
    Completed,
    Lost,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Submitted => "submitted",
            DealStatus::InReview => "in_review",
            DealStatus::Approved => "approved",
            DealStatus::Completed => "completed",
            DealStatus::Lost => "lost",
        }
    }

    pub fn is_commission_eligible(&self) -> bool {
        matches!(self, DealStatus::Completed)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "submitted" => Ok(DealStatus::Submitted),
            "in_review" => Ok(DealStatus::InReview),
            "approved" => Ok(DealStatus::Approved),
            "completed" => Ok(DealStatus::Completed),
            "lost" => Ok(DealStatus::Lost),
            other => Err(format!("unknown deal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deal {
    pub deal_id: DealId,
    pub submitting_partner_id: PartnerId,
    pub value_pence: i64,
    pub category: ProductCategory,
    pub locations: u32,
    pub status: DealStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDeal {
    pub submitting_partner_id: PartnerId,
    pub value_pence: i64,
    pub category: ProductCategory,
    #[serde(default = "NewDeal::default_locations")]
    pub locations: u32,
}

impl NewDeal {
    fn default_locations() -> u32 {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Direct,
    Override,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Direct => "direct",
            EntryKind::Override => "override",
        }
    }

    pub fn for_level(level: u32) -> Self {
        if level == 0 {
            EntryKind::Direct
        } else {
            EntryKind::Override
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(EntryKind::Direct),
            "override" => Ok(EntryKind::Override),
            other => Err(format!("unknown ledger entry kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub deal_id: DealId,
    pub payee_partner_id: PartnerId,
    /// 0 = direct, 1..N = override depth.
    pub level: u32,
    pub amount_pence: i64,
    pub kind: EntryKind,
    pub created_at: String,
}
