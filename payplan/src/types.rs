use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScheduleError;
use crate::BPS_SCALE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    CardProcessing,
    Funding,
    Insurance,
    Utilities,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 4] = [
        ProductCategory::CardProcessing,
        ProductCategory::Funding,
        ProductCategory::Insurance,
        ProductCategory::Utilities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::CardProcessing => "card_processing",
            ProductCategory::Funding => "funding",
            ProductCategory::Insurance => "insurance",
            ProductCategory::Utilities => "utilities",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the hyphenated spelling used on forms as well.
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        ProductCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == norm)
            .ok_or_else(|| format!("unknown product category: {s}"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Schedule {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub split: SplitRule,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

/// How a pool is divided between the submitter (level 0) and the upline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SplitRule {
    pub direct_bps: u32,
    pub first_override_bps: u32,
    pub decay_bps: u32,
    pub max_override_depth: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryRule {
    pub category: ProductCategory,
    pub basis: Basis,
    #[serde(default)]
    pub location: Option<LocationMultiplier>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Basis {
    /// Fixed base amount picked by the band the deal value falls in.
    Bands { bands: Vec<Band> },
    /// `value / unit × rate`, e.g. £100 per £10,000 funded.
    PerUnit { unit_pence: i64, rate_pence: i64 },
    Percentage { bps: u32 },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Band {
    /// Inclusive upper bound; `None` marks the open top band.
    #[serde(default)]
    pub up_to_pence: Option<i64>,
    pub base_pence: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationMultiplier {
    pub step_bps: u32,
    pub cap_bps: u32,
}

impl LocationMultiplier {
    /// Multiplier in bps for a deal spanning `locations` sites (1 = no uplift).
    pub fn multiplier_bps(&self, locations: u32) -> i128 {
        let extra = locations.saturating_sub(1) as i128;
        let raw = BPS_SCALE + extra * self.step_bps as i128;
        raw.min(self.cap_bps as i128).max(BPS_SCALE)
    }
}

impl Schedule {
    pub fn rule_for(&self, category: ProductCategory) -> Result<&CategoryRule, ScheduleError> {
        self.categories
            .iter()
            .find(|r| r.category == category)
            .ok_or(ScheduleError::UnknownCategory(category))
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        let split = &self.split;
        if split.decay_bps as i128 > BPS_SCALE {
            return Err(ScheduleError::InvalidDecay(split.decay_bps));
        }

        // Upper bound on the share of any pool paid when every level is claimed.
        // Levels round up here; the calculator floors, so real payouts stay below.
        let mut total = split.direct_bps as i128;
        let mut level = split.first_override_bps as i128;
        for _ in 0..split.max_override_depth {
            if level == 0 {
                break;
            }
            total += level;
            level = ceil_div(level * split.decay_bps as i128, BPS_SCALE);
        }
        if total > BPS_SCALE {
            return Err(ScheduleError::SplitExceedsPool { total_bps: total });
        }

        let mut seen = Vec::with_capacity(self.categories.len());
        for rule in &self.categories {
            if seen.contains(&rule.category) {
                return Err(ScheduleError::DuplicateCategory(rule.category));
            }
            seen.push(rule.category);
            rule.validate()?;
        }
        Ok(())
    }
}

impl CategoryRule {
    fn validate(&self) -> Result<(), ScheduleError> {
        let category = self.category;
        match &self.basis {
            Basis::Bands { bands } => {
                let bad = |reason: &str| ScheduleError::InvalidBands {
                    category,
                    reason: reason.to_string(),
                };
                if bands.is_empty() {
                    return Err(bad("at least one band is required"));
                }
                let mut prev: Option<i64> = None;
                for (i, band) in bands.iter().enumerate() {
                    if band.base_pence < 0 {
                        return Err(bad("base amounts must not be negative"));
                    }
                    match band.up_to_pence {
                        Some(bound) => {
                            if prev.is_some_and(|p| bound <= p) {
                                return Err(bad("bounds must be strictly ascending"));
                            }
                            prev = Some(bound);
                        }
                        None if i + 1 != bands.len() => {
                            return Err(bad("only the last band may be open-ended"));
                        }
                        None => {}
                    }
                }
            }
            Basis::PerUnit { unit_pence, rate_pence } => {
                if *unit_pence <= 0 || *rate_pence < 0 {
                    return Err(ScheduleError::InvalidBasis {
                        category,
                        reason: "unit must be positive and rate non-negative".into(),
                    });
                }
            }
            Basis::Percentage { bps } => {
                if *bps as i128 > BPS_SCALE {
                    return Err(ScheduleError::InvalidBasis {
                        category,
                        reason: format!("{bps} bps is more than the whole deal"),
                    });
                }
            }
        }
        if let Some(loc) = &self.location {
            if (loc.cap_bps as i128) < BPS_SCALE {
                return Err(ScheduleError::InvalidBasis {
                    category,
                    reason: "location cap below 10000 bps would shrink the pool".into(),
                });
            }
        }
        Ok(())
    }
}

fn ceil_div(num: i128, den: i128) -> i128 {
    (num + den - 1) / den
}
