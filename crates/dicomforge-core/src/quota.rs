use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const QUOTA_PATTERN: &str = r"^(\d+)(?:\.(\d+))?(KB|MB|GB)$";

/// Binary size unit accepted in quota expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Kb,
    Mb,
    Gb,
}

impl SizeUnit {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "KB" => Some(Self::Kb),
            "MB" => Some(Self::Mb),
            "GB" => Some(Self::Gb),
            _ => None,
        }
    }

    /// Number of bytes in one unit.
    pub fn multiplier(self) -> u64 {
        match self {
            Self::Kb => 1024,
            Self::Mb => 1024 * 1024,
            Self::Gb => 1024 * 1024 * 1024,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kb => "KB",
            Self::Mb => "MB",
            Self::Gb => "GB",
        }
    }
}

/// Total byte budget for one generation run.
///
/// Parsed from expressions such as `100MB`, `1.5GB` or `0KB`. Fractional
/// values truncate to whole bytes (`1.3KB` is 1331 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quota(u64);

impl Quota {
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Parse a `<number><KB|MB|GB>` expression into an exact byte count.
    pub fn parse(input: &str) -> Result<Self> {
        let pattern = Regex::new(QUOTA_PATTERN).map_err(|err| Error::Other(err.to_string()))?;
        let captures = pattern
            .captures(input)
            .ok_or_else(|| Error::invalid_format(input, diagnose(input)))?;

        let whole = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let fraction = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let unit = captures
            .get(3)
            .and_then(|m| SizeUnit::parse(m.as_str()))
            .ok_or_else(|| Error::invalid_format(input, "missing unit"))?;

        let whole: u64 = whole
            .parse()
            .map_err(|_| Error::invalid_format(input, "number is too large"))?;
        let multiplier = unit.multiplier();

        whole
            .checked_mul(multiplier)
            .and_then(|bytes| bytes.checked_add(scaled_fraction(fraction, multiplier)))
            .map(Self)
            .ok_or_else(|| Error::invalid_format(input, "number is too large"))
    }
}

impl FromStr for Quota {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// `floor(0.<digits> * multiplier)` without going through floating point.
///
/// Folds the decimal digits from least to most significant, carrying the
/// integer part of each partial product.
fn scaled_fraction(digits: &str, multiplier: u64) -> u64 {
    digits.bytes().rev().fold(0_u64, |carry, digit| {
        (u64::from(digit - b'0') * multiplier + carry) / 10
    })
}

fn diagnose(input: &str) -> String {
    if input.is_empty() {
        return "empty size".to_string();
    }
    if input.chars().any(char::is_whitespace) {
        return "whitespace is not allowed".to_string();
    }
    if input.starts_with('-') {
        return "negative sizes are not allowed".to_string();
    }

    let unit_start = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(unit_start);
    if unit.is_empty() {
        return "missing unit".to_string();
    }
    if SizeUnit::parse(unit).is_none() {
        return format!("unsupported unit '{unit}'");
    }
    format!("invalid number '{number}'")
}
