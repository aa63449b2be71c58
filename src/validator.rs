//! Shape checks applied to confirmed codes before a lookup.
//!
//! The 12-character floor is tuned for UPC/EAN-class codes read off a noisy
//! camera and favours precision over recall: it also rejects some shorter
//! real-world carrier codes (certain CODE39 formats). The floor is exposed as
//! `min_length` so it can be recalibrated without code changes.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_LENGTH: usize = 12;

/// `1Z` shipment numbers are 18 characters; the 17-character form printed
/// without the trailing check digit is classified the same way.
const UPS_LENGTHS: std::ops::RangeInclusive<usize> = 17..=18;

/// Why a code was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum Rejection {
    TooShort { length: usize, min: usize },
    InvalidCharacter { ch: char },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort { length, min } => {
                write!(f, "{length} characters, at least {min} required")
            }
            Rejection::InvalidCharacter { ch } => write!(f, "unexpected character {ch:?}"),
        }
    }
}

/// Advisory carrier classification based on code shape. Never used to reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierGuess {
    #[serde(rename = "UPS")]
    Ups,
    #[serde(rename = "FedEx-class")]
    FedExClass,
    #[serde(rename = "Other")]
    Other,
}

impl CarrierGuess {
    pub fn label(&self) -> &'static str {
        match self {
            CarrierGuess::Ups => "UPS",
            CarrierGuess::FedExClass => "FedEx-class",
            CarrierGuess::Other => "Other",
        }
    }

    /// Classify a trimmed code.
    pub fn classify(code: &str) -> Self {
        let len = code.chars().count();

        let ups_prefix = code
            .get(..2)
            .map(|prefix| prefix.eq_ignore_ascii_case("1Z"))
            .unwrap_or(false);
        if ups_prefix && UPS_LENGTHS.contains(&len) {
            return CarrierGuess::Ups;
        }

        let numeric = !code.is_empty() && code.chars().all(|c| c.is_ascii_digit());
        if numeric && matches!(len, 12..=14 | 20..=22) {
            return CarrierGuess::FedExClass;
        }

        CarrierGuess::Other
    }
}

impl fmt::Display for CarrierGuess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A code that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedCode {
    /// The trimmed code.
    pub code: String,
    pub carrier: CarrierGuess,
    /// All-numeric 12 or 13 digits: a UPC-A/EAN-13 retail symbol.
    pub retail_symbol: bool,
}

#[derive(Debug, Clone)]
pub struct CodeValidator {
    min_length: usize,
}

impl Default for CodeValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LENGTH)
    }
}

impl CodeValidator {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn validate(&self, raw: &str) -> Result<ValidatedCode, Rejection> {
        let code = raw.trim();
        let length = code.chars().count();

        if length < self.min_length {
            return Err(Rejection::TooShort {
                length,
                min: self.min_length,
            });
        }

        if let Some(ch) = code.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(Rejection::InvalidCharacter { ch });
        }

        let retail_symbol = matches!(length, 12 | 13) && code.chars().all(|c| c.is_ascii_digit());

        Ok(ValidatedCode {
            code: code.to_string(),
            carrier: CarrierGuess::classify(code),
            retail_symbol,
        })
    }
}
