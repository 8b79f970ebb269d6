// src/services/mod.rs

pub mod audit;
pub mod deals;
pub mod distributor;
pub mod guard;        // cycle guard, read-only
pub mod reconcile;
pub mod registry;     // the only writer of sponsor links
pub mod stats;
pub mod store;        // the ONLY SQLite owner
pub mod upline;

// Public API
pub use audit::AuditLog;
pub use distributor::Distribution;
pub use reconcile::{RepairOutcome, RepairPlan, SweepReport};
pub use stats::PartnerStats;
pub use store::Store;
