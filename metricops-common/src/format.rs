//! Number formatting for dashboard values
//!
//! Mirrors the browser's `Intl.NumberFormat` output closely enough for the
//! dashboard: grouped integer digits, an optional fixed or maximum number of
//! fraction digits, currency and percent styles. Grouping follows either the
//! western (1,234,567) or the Indian (12,34,567) convention.

use serde::{Deserialize, Serialize};

/// Placeholder shown for missing or non-finite values
pub const MISSING: &str = "—";

/// Digit grouping convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// Groups of three: 1,234,567
    Western,
    /// Last three digits, then groups of two: 12,34,567
    Indian,
}

impl Grouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grouping::Western => "western",
            Grouping::Indian => "indian",
        }
    }
}

/// Insert group separators into a run of ASCII digits.
pub fn group_digits(digits: &str, grouping: Grouping) -> String {
    let len = digits.len();
    if len <= 3 {
        return digits.to_string();
    }

    let (head, tail) = digits.split_at(len - 3);
    let group = match grouping {
        Grouping::Western => 3,
        Grouping::Indian => 2,
    };

    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(group);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    let mut out = groups.join(",");
    out.push(',');
    out.push_str(tail);
    out
}

/// Sign of a value as shown to the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Strictly above zero
    Positive,
    /// Strictly below zero
    Negative,
    /// Zero, missing or not finite
    Neutral,
}

impl Tone {
    pub fn of(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() && v > 0.0 => Tone::Positive,
            Some(v) if v.is_finite() && v < 0.0 => Tone::Negative,
            _ => Tone::Neutral,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Tone::Positive => "↑",
            Tone::Negative => "↓",
            Tone::Neutral => "→",
        }
    }
}

/// A formatted delta together with its tone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed {
    pub text: String,
    pub tone: Tone,
}

/// Formats numbers with one grouping convention and currency symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub grouping: Grouping,
    pub currency_symbol: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            grouping: Grouping::Indian,
            currency_symbol: "₹".to_string(),
        }
    }
}

impl NumberFormat {
    pub fn new(grouping: Grouping, currency_symbol: impl Into<String>) -> Self {
        Self {
            grouping,
            currency_symbol: currency_symbol.into(),
        }
    }

    /// Format `|value|` with exactly `min` to `max` fraction digits.
    fn magnitude(&self, value: f64, min: usize, max: usize) -> String {
        let rendered = format!("{:.*}", max, value.abs());
        let (int_part, frac_part) = match rendered.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rendered.as_str(), ""),
        };

        let mut frac = frac_part.trim_end_matches('0').to_string();
        while frac.len() < min {
            frac.push('0');
        }

        let grouped = group_digits(int_part, self.grouping);
        if frac.is_empty() {
            grouped
        } else {
            format!("{}.{}", grouped, frac)
        }
    }

    fn with_sign(value: f64, body: String) -> String {
        // "-0" after rounding reads as zero
        if value < 0.0 && body.chars().any(|c| c.is_ascii_digit() && c != '0') {
            format!("-{}", body)
        } else {
            body
        }
    }

    /// Up to `max_fraction` fraction digits, trailing zeros dropped
    pub fn decimal(&self, value: f64, max_fraction: usize) -> String {
        if !value.is_finite() {
            return MISSING.to_string();
        }
        Self::with_sign(value, self.magnitude(value, 0, max_fraction))
    }

    /// Exactly `decimals` fraction digits
    pub fn fixed(&self, value: f64, decimals: usize) -> String {
        if !value.is_finite() {
            return MISSING.to_string();
        }
        Self::with_sign(value, self.magnitude(value, decimals, decimals))
    }

    /// Whole number, rounded
    pub fn count(&self, value: f64) -> String {
        self.fixed(value, 0)
    }

    /// Currency symbol before the grouped amount, e.g. `-₹1,500`
    pub fn currency(&self, value: f64, decimals: usize) -> String {
        if !value.is_finite() {
            return MISSING.to_string();
        }
        let body = format!(
            "{}{}",
            self.currency_symbol,
            self.magnitude(value, decimals, decimals)
        );
        Self::with_sign(value, body)
    }

    /// A fraction as a percentage: 0.1234 → `12.34%`
    pub fn percent(&self, fraction: f64) -> String {
        if !fraction.is_finite() {
            return MISSING.to_string();
        }
        format!("{}%", self.decimal(fraction * 100.0, 2))
    }

    /// A fractional rate difference in percentage points: 0.0125 → `1.25 pp`
    pub fn percentage_points(&self, fraction: f64) -> String {
        if !fraction.is_finite() {
            return MISSING.to_string();
        }
        format!("{} pp", self.decimal(fraction * 100.0, 2))
    }

    /// Optional value through `format`, with the placeholder for `None`
    pub fn optional(&self, value: Option<f64>, format: impl Fn(&Self, f64) -> String) -> String {
        match value {
            Some(v) if v.is_finite() => format(self, v),
            _ => MISSING.to_string(),
        }
    }

    /// Delta with a leading `+` for positive values and its tone
    pub fn signed(&self, value: Option<f64>, format: impl Fn(&Self, f64) -> String) -> Signed {
        let tone = Tone::of(value);
        let text = match value {
            Some(v) if v.is_finite() => {
                let body = format(self, v);
                if tone == Tone::Positive {
                    format!("+{}", body)
                } else {
                    body
                }
            }
            _ => MISSING.to_string(),
        };
        Signed { text, tone }
    }
}
