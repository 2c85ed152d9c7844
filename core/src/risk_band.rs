//! Risk band classifier.
//!
//! RULE: `RiskBand::bounds()` is the only place band thresholds live.
//! `classify()` and the query builder's range predicate both read it,
//! so a row filtered as HIGH is always displayed as HIGH.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ── Thresholds ───────────────────────────────────────────────────────────────

const MEDIUM_FLOOR: f64 = 50.0;
const HIGH_FLOOR: f64 = 70.0;
const CRITICAL_FLOOR: f64 = 85.0;

/// Discrete severity derived from a continuous risk score.
/// Ordered: LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    /// Every band, lowest first.
    pub const ALL: [RiskBand; 4] = [
        RiskBand::Low,
        RiskBand::Medium,
        RiskBand::High,
        RiskBand::Critical,
    ];

    /// Half-open score range `[lower, upper)` covered by this band.
    ///
    /// `None` is an open side: LOW has no floor (negative scores clamp
    /// into it) and CRITICAL has no ceiling.
    pub fn bounds(self) -> (Option<f64>, Option<f64>) {
        match self {
            RiskBand::Low      => (None, Some(MEDIUM_FLOOR)),
            RiskBand::Medium   => (Some(MEDIUM_FLOOR), Some(HIGH_FLOOR)),
            RiskBand::High     => (Some(HIGH_FLOOR), Some(CRITICAL_FLOOR)),
            RiskBand::Critical => (Some(CRITICAL_FLOOR), None),
        }
    }

    /// True if `score` falls inside this band's bounds.
    pub fn contains(self, score: f64) -> bool {
        let (lower, upper) = self.bounds();
        lower.map_or(true, |lo| score >= lo) && upper.map_or(true, |hi| score < hi)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskBand::Low      => "LOW",
            RiskBand::Medium   => "MEDIUM",
            RiskBand::High     => "HIGH",
            RiskBand::Critical => "CRITICAL",
        }
    }
}

/// Map a risk score to its band. Total over all f64 values:
/// negative scores and NaN are LOW, +inf is CRITICAL.
pub fn classify(score: f64) -> RiskBand {
    if score.is_nan() {
        return RiskBand::Low;
    }
    // Highest band whose floor the score reaches.
    RiskBand::ALL
        .iter()
        .rev()
        .copied()
        .find(|band| band.bounds().0.map_or(true, |lo| score >= lo))
        .unwrap_or(RiskBand::Low)
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRiskBand(pub String);

impl fmt::Display for UnknownRiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown risk band '{}'", self.0)
    }
}

impl std::error::Error for UnknownRiskBand {}

impl FromStr for RiskBand {
    type Err = UnknownRiskBand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW"      => Ok(RiskBand::Low),
            "MEDIUM"   => Ok(RiskBand::Medium),
            "HIGH"     => Ok(RiskBand::High),
            "CRITICAL" => Ok(RiskBand::Critical),
            _          => Err(UnknownRiskBand(s.to_string())),
        }
    }
}
