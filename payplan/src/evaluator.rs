use crate::error::ScheduleError;
use crate::types::{Basis, ProductCategory, Schedule, SplitRule};
use crate::BPS_SCALE;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

// ----------------- Input / Result -----------------

/// The slice of a deal the calculator looks at.
#[derive(Debug, Clone, Copy)]
pub struct DealInput {
    pub value_pence: i64,
    pub category: ProductCategory,
    pub locations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelShare {
    pub level: u32,
    pub amount_pence: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolBreakdown {
    pub category: ProductCategory,
    pub base_pence: i64,
    pub multiplier_bps: i64,
    pub total_pool_pence: i64,
    /// Level 0, paid to the submitting partner.
    pub direct_pence: i64,
    /// Levels 1..=max_override_depth, nonzero amounts only.
    pub overrides: Vec<LevelShare>,
}

impl PoolBreakdown {
    pub fn amount_for_level(&self, level: u32) -> i64 {
        if level == 0 {
            return self.direct_pence;
        }
        self.overrides
            .iter()
            .find(|s| s.level == level)
            .map(|s| s.amount_pence)
            .unwrap_or(0)
    }

    /// Everything the schedule would pay if every level were claimed.
    pub fn scheduled_total(&self) -> i64 {
        self.direct_pence + self.overrides.iter().map(|s| s.amount_pence).sum::<i64>()
    }
}

// ----------------- I/O -----------------

pub fn load_schedule_from_file(path: &Path) -> Result<Schedule> {
    let text = fs::read_to_string(path).with_context(|| format!("read schedule {:?}", path))?;
    let schedule = crate::parse_schedule(&text).with_context(|| format!("load schedule {:?}", path))?;
    Ok(schedule)
}

// ----------------- Helpers -----------------

fn base_amount(basis: &Basis, value: i64) -> Option<i64> {
    let wide = match basis {
        Basis::Bands { bands } => {
            let hit = bands
                .iter()
                .find(|b| b.up_to_pence.map_or(true, |bound| value <= bound))
                .or_else(|| bands.last());
            return Some(hit.map(|b| b.base_pence).unwrap_or(0));
        }
        Basis::PerUnit { unit_pence, rate_pence } => {
            value as i128 * *rate_pence as i128 / *unit_pence as i128
        }
        Basis::Percentage { bps } => value as i128 * *bps as i128 / BPS_SCALE,
    };
    i64::try_from(wide).ok()
}

/// Floors every level and never hands out more than is left of the pool.
fn split_pool(pool: i64, split: &SplitRule) -> (i64, Vec<LevelShare>) {
    let pool = pool as i128;
    let direct = (pool * split.direct_bps as i128 / BPS_SCALE).min(pool);
    let mut remaining = pool - direct;

    let mut overrides = Vec::new();
    let mut amount = pool * split.first_override_bps as i128 / BPS_SCALE;
    for level in 1..=split.max_override_depth {
        let paid = amount.min(remaining);
        if paid <= 0 {
            break;
        }
        overrides.push(LevelShare {
            level,
            amount_pence: paid as i64,
        });
        remaining -= paid;
        amount = amount * split.decay_bps as i128 / BPS_SCALE;
    }
    (direct as i64, overrides)
}

// ----------------- Core -----------------

/// Compute the commission pool for a deal and how it is scheduled across levels.
///
/// Divisions floor and each level is capped by what is left, so the scheduled
/// total never exceeds the pool. Amounts that overflow `i64` are rejected.
pub fn compute_pool(deal: &DealInput, schedule: &Schedule) -> Result<PoolBreakdown, ScheduleError> {
    if deal.value_pence < 0 {
        return Err(ScheduleError::NegativeValue(deal.value_pence));
    }
    let rule = schedule.rule_for(deal.category)?;
    let overflow = || ScheduleError::AmountOverflow {
        category: deal.category,
        value_pence: deal.value_pence,
    };
    let base = base_amount(&rule.basis, deal.value_pence).ok_or_else(|| overflow())?;
    let multiplier = rule
        .location
        .as_ref()
        .map(|loc| loc.multiplier_bps(deal.locations))
        .unwrap_or(BPS_SCALE);
    let pool = i64::try_from(base as i128 * multiplier / BPS_SCALE).map_err(|_| overflow())?;

    let (direct, overrides) = split_pool(pool, &schedule.split);

    Ok(PoolBreakdown {
        category: deal.category,
        base_pence: base,
        multiplier_bps: multiplier as i64,
        total_pool_pence: pool,
        direct_pence: direct,
        overrides,
    })
}
