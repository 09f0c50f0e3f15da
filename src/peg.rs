//! Peg ratio between custodial reserves and circulating supply.

use std::fmt;

use serde::Serialize;

use crate::display::format_percent;
use crate::error::{PorError, Result};

/// Upper bound on the reported ratio, in percent.
pub const MAX_RATIO: f64 = 100.0;

/// Ratio at or above which the peg is considered stable.
pub const STABLE_THRESHOLD: f64 = 99.0;

/// Ratio at or above which the peg is deviating but not broken.
pub const DEVIATION_THRESHOLD: f64 = 95.0;

/// Computes the peg ratio as a percentage, capped at 100% and rounded to two
/// decimals so the health band matches the displayed value.
///
/// # Errors
/// Returns `PorError::InvalidInput` for negative or non-finite amounts and for
/// zero circulation.
pub fn peg_ratio(reserves: f64, circulation: f64) -> Result<f64> {
    validate_amount("reserves", reserves)?;
    validate_amount("circulation", circulation)?;

    if circulation == 0.0 {
        return Err(PorError::invalid_input("circulation must be greater than zero"));
    }

    let ratio = (reserves / circulation * 100.0).min(MAX_RATIO);
    Ok((ratio * 100.0).round() / 100.0)
}

fn validate_amount(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(PorError::invalid_input(format!("{name} must be a finite number")));
    }
    if value < 0.0 {
        return Err(PorError::invalid_input(format!("{name} must not be negative")));
    }
    Ok(())
}

/// Health band of the peg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PegHealth {
    /// Ratio at or above 99%.
    Stable,
    /// Ratio at or above 95%.
    Deviating,
    /// Anything lower.
    Unpegged,
}

impl PegHealth {
    /// Classifies a ratio (in percent).
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= STABLE_THRESHOLD {
            Self::Stable
        } else if ratio >= DEVIATION_THRESHOLD {
            Self::Deviating
        } else {
            Self::Unpegged
        }
    }

    /// Human-readable description of the band.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stable => "Fully backed — Peg is stable",
            Self::Deviating => "Slight deviation — Monitor reserves",
            Self::Unpegged => "Unpegged — Action required",
        }
    }
}

/// A computed peg snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PegStatus {
    pub reserves: f64,
    pub circulation: f64,
    pub ratio: f64,
    pub health: PegHealth,
}

impl PegStatus {
    /// Computes the peg status for the given amounts.
    pub fn compute(reserves: f64, circulation: f64) -> Result<Self> {
        let ratio = peg_ratio(reserves, circulation)?;
        Ok(Self {
            reserves,
            circulation,
            ratio,
            health: PegHealth::from_ratio(ratio),
        })
    }
}

impl fmt::Display for PegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", format_percent(self.ratio), self.health.label())
    }
}
