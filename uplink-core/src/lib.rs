// src/lib.rs
//! Uplink-Core: partner sponsorship tree and commission attribution.
//!
//! The engine keeps two views of "who recruited whom": the `sponsor_id` pointer on
//! each partner row and the `hierarchy_edges` closure table. Reads trust the closure
//! table; both are written in one transaction; `services::reconcile` finds and
//! repairs drift between them.

pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod services;

pub use commands::{Engine, EngineSettings};
pub use error::EngineError;
