use payplan::assets::{read_verified_or_embedded, write_default_schedules, STANDARD_TOML, STANDARD_TOML_NAME};
use payplan::types::ProductCategory;
use payplan::{parse_schedule, standard_schedule, ScheduleError};

fn with_split(split: &str, categories: &str) -> String {
    format!("name = \"t\"\nversion = \"0.0.1\"\n\n[split]\n{split}\n{categories}")
}

const FUNDING: &str = r#"
[[categories]]
category = "funding"
basis = { method = "per_unit", unit_pence = 1000000, rate_pence = 10000 }
"#;

#[test]
fn standard_schedule_covers_every_category() {
    let schedule = standard_schedule().expect("embedded schedule is valid");
    for category in ProductCategory::ALL {
        assert!(schedule.rule_for(category).is_ok(), "missing rule for {category}");
    }
    assert_eq!(schedule.split.max_override_depth, 3);
}

#[test]
fn split_that_overpays_is_rejected() {
    let text = with_split(
        "direct_bps = 9000\nfirst_override_bps = 2000\ndecay_bps = 5000\nmax_override_depth = 2",
        FUNDING,
    );
    let err = parse_schedule(&text).unwrap_err();
    assert!(matches!(err, ScheduleError::SplitExceedsPool { total_bps: 12_000 }));
}

#[test]
fn split_check_is_an_upper_bound_for_large_pools() {
    // Floored on a 10000 pool this sums to exactly 10000, yet a 100,000,000p
    // pool would pay 100,009,999p. Rounding levels up exposes the overrun.
    let insurance = r#"
[[categories]]
category = "insurance"
basis = { method = "percentage", bps = 10000 }
"#;
    let text = with_split(
        "direct_bps = 1\nfirst_override_bps = 9999\ndecay_bps = 1\nmax_override_depth = 2",
        insurance,
    );
    let err = parse_schedule(&text).unwrap_err();
    assert!(matches!(err, ScheduleError::SplitExceedsPool { total_bps: 10_001 }));

    // A one-level version of the same split fits exactly.
    let one_level = with_split(
        "direct_bps = 1\nfirst_override_bps = 9999\ndecay_bps = 1\nmax_override_depth = 1",
        insurance,
    );
    assert!(parse_schedule(&one_level).is_ok());
}

#[test]
fn growing_decay_is_rejected() {
    let text = with_split(
        "direct_bps = 1000\nfirst_override_bps = 1000\ndecay_bps = 15000\nmax_override_depth = 2",
        FUNDING,
    );
    assert!(matches!(parse_schedule(&text).unwrap_err(), ScheduleError::InvalidDecay(15_000)));
}

#[test]
fn bands_must_ascend_and_only_the_last_may_be_open() {
    let split = "direct_bps = 6000\nfirst_override_bps = 2000\ndecay_bps = 5000\nmax_override_depth = 3";
    let descending = r#"
[[categories]]
category = "utilities"
basis = { method = "bands", bands = [ { up_to_pence = 500, base_pence = 1 }, { up_to_pence = 100, base_pence = 2 } ] }
"#;
    let err = parse_schedule(&with_split(split, descending)).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidBands { category: ProductCategory::Utilities, .. }));

    let open_middle = r#"
[[categories]]
category = "utilities"
basis = { method = "bands", bands = [ { base_pence = 1 }, { up_to_pence = 100, base_pence = 2 } ] }
"#;
    let err = parse_schedule(&with_split(split, open_middle)).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidBands { .. }));
}

#[test]
fn duplicate_categories_are_rejected() {
    let split = "direct_bps = 6000\nfirst_override_bps = 2000\ndecay_bps = 5000\nmax_override_depth = 3";
    let twice = format!("{FUNDING}{FUNDING}");
    let err = parse_schedule(&with_split(split, &twice)).unwrap_err();
    assert!(matches!(err, ScheduleError::DuplicateCategory(ProductCategory::Funding)));
}

#[test]
fn product_category_parses_form_spelling() {
    assert_eq!("card-processing".parse::<ProductCategory>(), Ok(ProductCategory::CardProcessing));
    assert_eq!("Utilities".parse::<ProductCategory>(), Ok(ProductCategory::Utilities));
    assert!("mortgages".parse::<ProductCategory>().is_err());
}

#[test]
fn locked_read_restores_tampered_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let created = write_default_schedules(dir.path()).unwrap();
    assert_eq!(created, vec![STANDARD_TOML_NAME.to_string()]);
    assert!(write_default_schedules(dir.path()).unwrap().is_empty());

    let path = dir.path().join(STANDARD_TOML_NAME);
    std::fs::write(&path, "name = \"tampered\"").unwrap();

    let unlocked = read_verified_or_embedded(&path, STANDARD_TOML_NAME, false).unwrap();
    assert_eq!(unlocked.as_ref(), "name = \"tampered\"");

    let locked = read_verified_or_embedded(&path, STANDARD_TOML_NAME, true).unwrap();
    assert_eq!(locked.as_ref(), STANDARD_TOML);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), STANDARD_TOML);
}

#[test]
fn unknown_missing_schedule_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bespoke.toml");
    assert!(read_verified_or_embedded(&path, "bespoke.toml", true).is_err());
}
