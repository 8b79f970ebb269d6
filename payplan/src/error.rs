use thiserror::Error;

use crate::types::ProductCategory;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("schedule parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no commission rule for category {0}")]
    UnknownCategory(ProductCategory),

    #[error("category {0} is configured more than once")]
    DuplicateCategory(ProductCategory),

    #[error("invalid bands for {category}: {reason}")]
    InvalidBands {
        category: ProductCategory,
        reason: String,
    },

    #[error("invalid basis for {category}: {reason}")]
    InvalidBasis {
        category: ProductCategory,
        reason: String,
    },

    #[error("split pays {total_bps} bps of every pool, more than 10000")]
    SplitExceedsPool { total_bps: i128 },

    #[error("decay of {0} bps would grow overrides level over level")]
    InvalidDecay(u32),

    #[error("{category} commission for {value_pence}p does not fit in 64-bit pence")]
    AmountOverflow {
        category: ProductCategory,
        value_pence: i64,
    },

    #[error("deal value must not be negative (got {0})")]
    NegativeValue(i64),
}
