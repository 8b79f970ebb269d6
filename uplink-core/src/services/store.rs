// src/services/store.rs
//! Single-owner SQLite store for partners, closure edges, deals and the ledger.
//!
//! - Owns one connection (WAL) per engine; several engines may share a file.
//! - Every mutation runs in a `BEGIN IMMEDIATE` transaction so writers are
//!   serialised by SQLite itself.
//! - The row helpers below take `&Connection` so they work the same inside a
//!   transaction (`Transaction` derefs to `Connection`).

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EngineResult;
use crate::model::{Deal, HierarchyEdge, LedgerEntry, Partner};

pub struct Store {
    pub(crate) db: Connection,
}

impl Store {
    /// Open/create the SQLite DB and ensure schema.
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all({:?})", parent))?;
        }
        let db = Connection::open(db_path).with_context(|| format!("open sqlite at {:?}", db_path))?;
        db.busy_timeout(busy_timeout)?;
        db.execute_batch(SCHEMA).context("ensure uplink schema")?;
        Ok(Self { db })
    }

    /// Start a write transaction that holds the database write lock from its first statement.
    pub(crate) fn begin(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.db.transaction_with_behavior(TransactionBehavior::Immediate)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.db
    }
}

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS partners (
  partner_id      TEXT PRIMARY KEY,
  partner_code    TEXT NOT NULL UNIQUE,          -- shareable signup code
  sponsor_id      TEXT REFERENCES partners(partner_id),
  name            TEXT NOT NULL,
  email           TEXT NOT NULL,
  active          INTEGER NOT NULL DEFAULT 1,
  created_at      TEXT NOT NULL,                 -- RFC3339 UTC
  deactivated_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_partners_sponsor ON partners(sponsor_id);

-- Closure table: one row per (partner, ancestor). A child holds one ancestor per
-- level, so it can be linked under exactly one sponsor.
CREATE TABLE IF NOT EXISTS hierarchy_edges (
  child_id     TEXT NOT NULL REFERENCES partners(partner_id),
  ancestor_id  TEXT NOT NULL REFERENCES partners(partner_id),
  level        INTEGER NOT NULL CHECK (level > 0),
  created_at   TEXT NOT NULL,
  PRIMARY KEY (child_id, level)
);
CREATE INDEX IF NOT EXISTS idx_edges_child ON hierarchy_edges(child_id);
CREATE INDEX IF NOT EXISTS idx_edges_ancestor ON hierarchy_edges(ancestor_id);

CREATE TABLE IF NOT EXISTS deals (
  deal_id                TEXT PRIMARY KEY,
  submitting_partner_id  TEXT NOT NULL REFERENCES partners(partner_id),
  value_pence            INTEGER NOT NULL CHECK (value_pence >= 0),
  category               TEXT NOT NULL,
  locations              INTEGER NOT NULL DEFAULT 1,
  status                 TEXT NOT NULL,
  created_at             TEXT NOT NULL,
  updated_at             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deals_partner ON deals(submitting_partner_id);

CREATE TABLE IF NOT EXISTS ledger_entries (
  entry_id          TEXT PRIMARY KEY,
  deal_id           TEXT NOT NULL REFERENCES deals(deal_id),
  payee_partner_id  TEXT NOT NULL REFERENCES partners(partner_id),
  level             INTEGER NOT NULL CHECK (level >= 0),
  amount_pence      INTEGER NOT NULL CHECK (amount_pence >= 0),
  kind              TEXT NOT NULL CHECK (kind IN ('direct', 'override')),
  created_at        TEXT NOT NULL,
  UNIQUE (deal_id, payee_partner_id, level)
);
CREATE INDEX IF NOT EXISTS idx_ledger_payee ON ledger_entries(payee_partner_id);
CREATE INDEX IF NOT EXISTS idx_ledger_deal ON ledger_entries(deal_id);
"#;

// ---------- row mapping ----------

fn parsed<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

const PARTNER_COLS: &str =
    "partner_id, partner_code, sponsor_id, name, email, active, created_at, deactivated_at";

fn partner_from_row(row: &Row<'_>) -> rusqlite::Result<Partner> {
    Ok(Partner {
        partner_id: row.get(0)?,
        partner_code: row.get(1)?,
        sponsor_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
        deactivated_at: row.get(7)?,
    })
}

const DEAL_COLS: &str =
    "deal_id, submitting_partner_id, value_pence, category, locations, status, created_at, updated_at";

fn deal_from_row(row: &Row<'_>) -> rusqlite::Result<Deal> {
    Ok(Deal {
        deal_id: row.get(0)?,
        submitting_partner_id: row.get(1)?,
        value_pence: row.get(2)?,
        category: parsed(row, 3)?,
        locations: row.get(4)?,
        status: parsed(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        entry_id: row.get(0)?,
        deal_id: row.get(1)?,
        payee_partner_id: row.get(2)?,
        level: row.get(3)?,
        amount_pence: row.get(4)?,
        kind: parsed(row, 5)?,
        created_at: row.get(6)?,
    })
}

// ---------- partners ----------

pub(crate) fn get_partner(conn: &Connection, partner_id: &str) -> EngineResult<Option<Partner>> {
    let sql = format!("SELECT {PARTNER_COLS} FROM partners WHERE partner_id = ?1");
    Ok(conn.query_row(&sql, [partner_id], partner_from_row).optional()?)
}

pub(crate) fn find_partner_by_code(conn: &Connection, code: &str) -> EngineResult<Option<Partner>> {
    let sql = format!("SELECT {PARTNER_COLS} FROM partners WHERE partner_code = ?1");
    Ok(conn.query_row(&sql, [code], partner_from_row).optional()?)
}

pub(crate) fn sponsor_of(conn: &Connection, partner_id: &str) -> EngineResult<Option<Option<String>>> {
    Ok(conn
        .query_row(
            "SELECT sponsor_id FROM partners WHERE partner_id = ?1",
            [partner_id],
            |r| r.get::<_, Option<String>>(0),
        )
        .optional()?)
}

pub(crate) fn all_partner_ids(conn: &Connection) -> EngineResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT partner_id FROM partners ORDER BY created_at, partner_id")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ---------- closure edges ----------

pub(crate) fn edges_for_child(conn: &Connection, child_id: &str) -> EngineResult<Vec<HierarchyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT child_id, ancestor_id, level, created_at
         FROM hierarchy_edges
         WHERE child_id = ?1
         ORDER BY level, ancestor_id",
    )?;
    let rows = stmt.query_map([child_id], |r| {
        Ok(HierarchyEdge {
            child_id: r.get(0)?,
            ancestor_id: r.get(1)?,
            level: r.get(2)?,
            created_at: r.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// `(descendant_id, level)` for everyone below `ancestor_id`, nearest first.
pub(crate) fn descendants_of(conn: &Connection, ancestor_id: &str) -> EngineResult<Vec<(String, u32)>> {
    let mut stmt = conn.prepare(
        "SELECT child_id, level FROM hierarchy_edges
         WHERE ancestor_id = ?1
         ORDER BY level, child_id",
    )?;
    let rows = stmt.query_map([ancestor_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u32>(1)?)))?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub(crate) fn insert_edge(
    conn: &Connection,
    child_id: &str,
    ancestor_id: &str,
    level: u32,
    created_at: &str,
) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO hierarchy_edges(child_id, ancestor_id, level, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![child_id, ancestor_id, level, created_at],
    )?;
    Ok(())
}

pub(crate) fn delete_edge(conn: &Connection, child_id: &str, ancestor_id: &str, level: u32) -> EngineResult<usize> {
    Ok(conn.execute(
        "DELETE FROM hierarchy_edges WHERE child_id = ?1 AND ancestor_id = ?2 AND level = ?3",
        params![child_id, ancestor_id, level],
    )?)
}

// ---------- deals + ledger ----------

pub(crate) fn get_deal(conn: &Connection, deal_id: &str) -> EngineResult<Option<Deal>> {
    let sql = format!("SELECT {DEAL_COLS} FROM deals WHERE deal_id = ?1");
    Ok(conn.query_row(&sql, [deal_id], deal_from_row).optional()?)
}

pub(crate) fn ledger_for_deal(conn: &Connection, deal_id: &str) -> EngineResult<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, deal_id, payee_partner_id, level, amount_pence, kind, created_at
         FROM ledger_entries
         WHERE deal_id = ?1
         ORDER BY level, payee_partner_id",
    )?;
    let rows = stmt.query_map([deal_id], ledger_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
