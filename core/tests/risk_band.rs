//! Risk band classifier: partition, boundaries, parsing.

use amlwatch_core::risk_band::{classify, RiskBand};

/// Scores right at and just under each threshold land in the right band.
#[test]
fn boundaries_are_inclusive_low_exclusive_high() {
    let cases = [
        (0.0, RiskBand::Low),
        (49.99, RiskBand::Low),
        (50.0, RiskBand::Medium),
        (69.99, RiskBand::Medium),
        (70.0, RiskBand::High),
        (84.99, RiskBand::High),
        (85.0, RiskBand::Critical),
        (100.0, RiskBand::Critical),
    ];
    for (score, expected) in cases {
        assert_eq!(classify(score), expected, "score {score}");
    }
}

/// Out-of-range inputs still classify.
#[test]
fn classify_is_total() {
    assert_eq!(classify(-12.0), RiskBand::Low);
    assert_eq!(classify(f64::NAN), RiskBand::Low);
    assert_eq!(classify(f64::NEG_INFINITY), RiskBand::Low);
    assert_eq!(classify(f64::INFINITY), RiskBand::Critical);
    assert_eq!(classify(1_000.0), RiskBand::Critical);
}

/// Every score in a sweep belongs to exactly one band, and that band is
/// the one `classify` returns.
#[test]
fn bands_partition_the_score_line() {
    let mut score = -5.0;
    while score <= 105.0 {
        let owners: Vec<RiskBand> = RiskBand::ALL
            .iter()
            .copied()
            .filter(|b| b.contains(score))
            .collect();
        assert_eq!(owners.len(), 1, "score {score} owned by {owners:?}");
        assert_eq!(owners[0], classify(score), "score {score}");
        score += 0.25;
    }
}

/// Adjacent bands share their boundary value, with no gap between them.
#[test]
fn adjacent_bounds_meet() {
    for pair in RiskBand::ALL.windows(2) {
        let (_, upper) = pair[0].bounds();
        let (lower, _) = pair[1].bounds();
        assert_eq!(upper, lower, "{} / {}", pair[0], pair[1]);
    }
    assert_eq!(RiskBand::Low.bounds().0, None);
    assert_eq!(RiskBand::Critical.bounds().1, None);
}

#[test]
fn bands_are_ordered() {
    assert!(RiskBand::Low < RiskBand::Medium);
    assert!(RiskBand::Medium < RiskBand::High);
    assert!(RiskBand::High < RiskBand::Critical);
}

/// Band names parse case-insensitively; anything else is rejected.
#[test]
fn parse_band_names() {
    assert_eq!("HIGH".parse::<RiskBand>().unwrap(), RiskBand::High);
    assert_eq!("critical".parse::<RiskBand>().unwrap(), RiskBand::Critical);
    assert_eq!(" Medium ".parse::<RiskBand>().unwrap(), RiskBand::Medium);
    assert!("SEVERE".parse::<RiskBand>().is_err());
    assert!("".parse::<RiskBand>().is_err());
    assert_eq!(RiskBand::Low.to_string(), "LOW");
}
