//! Compact recurrence rules: `FREQ=DAILY|WEEKLY|MONTHLY;INTERVAL=n`.
//!
//! Rules are validated when they are accepted into storage (add / edit paths),
//! so a scan never sees an invalid rule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid recurrence rule: {0}")]
pub struct ParseRuleError(String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub freq: Frequency,
    /// Number of periods between occurrences, always >= 1.
    pub interval: u32,
}

impl Rule {
    /// The next occurrence after `after`.
    ///
    /// IMPORTANT: MONTHLY is a fixed 30-day step, deliberately NOT true
    /// calendar-month arithmetic. Over many occurrences this drifts against
    /// the calendar; that drift is the documented, tested behavior and must
    /// not be "fixed" quietly.
    pub fn next(&self, after: DateTime<Tz>) -> DateTime<Tz> {
        let step = match self.freq {
            Frequency::Daily => Duration::days(i64::from(self.interval)),
            Frequency::Weekly => Duration::weeks(i64::from(self.interval)),
            Frequency::Monthly => Duration::days(30 * i64::from(self.interval)),
        };
        after + step
    }

    /// Human-readable form for task rendering, e.g. "every 2 weeks".
    pub fn describe(&self) -> String {
        let (singular, plural) = match self.freq {
            Frequency::Daily => ("day", "days"),
            Frequency::Weekly => ("week", "weeks"),
            Frequency::Monthly => ("month", "months"),
        };
        match self.interval {
            1 => format!("every {singular}"),
            n => format!("every {n} {plural}"),
        }
    }
}

impl FromStr for Rule {
    type Err = ParseRuleError;

    /// Parses `;`-separated `KEY=VALUE` pairs. `FREQ` is required and must be
    /// one of DAILY/WEEKLY/MONTHLY (case-insensitive). `INTERVAL` is optional;
    /// a non-numeric or non-positive value is clamped to 1 rather than
    /// rejected. Unknown keys are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut freq = None;
        let mut interval = 1u32;
        for piece in s.split(';') {
            let Some((key, value)) = piece.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(match value.trim().to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        _ => return Err(ParseRuleError(s.to_string())),
                    });
                }
                "INTERVAL" => {
                    interval = value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n >= 1)
                        .unwrap_or(1);
                }
                _ => {}
            }
        }
        let freq = freq.ok_or_else(|| ParseRuleError(s.to_string()))?;
        Ok(Rule { freq, interval })
    }
}

impl fmt::Display for Rule {
    /// Canonical stored form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let freq = match self.freq {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        };
        write!(f, "FREQ={};INTERVAL={}", freq, self.interval)
    }
}
