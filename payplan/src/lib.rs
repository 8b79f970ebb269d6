// Public modules so uplink-core can use them
pub mod assets;
pub mod error;
pub mod evaluator;
pub mod types;

pub use assets::{default_schedule_text, write_default_schedules};
pub use error::ScheduleError;
pub use evaluator::{compute_pool, load_schedule_from_file, DealInput, LevelShare, PoolBreakdown};
pub use types::{Band, Basis, CategoryRule, LocationMultiplier, ProductCategory, Schedule, SplitRule};

/// Basis-point denominator used by every rate in a schedule.
pub const BPS_SCALE: i128 = 10_000;

/// --- Pure Rust API for uplink-core ---
pub fn parse_schedule(text: &str) -> Result<Schedule, ScheduleError> {
    let schedule: Schedule = toml::from_str(text)?;
    schedule.validate()?;
    Ok(schedule)
}

/// The canonical plan shipped with the crate, already validated.
pub fn standard_schedule() -> Result<Schedule, ScheduleError> {
    parse_schedule(assets::STANDARD_TOML)
}
