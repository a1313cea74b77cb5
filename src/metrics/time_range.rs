//! Reporting windows and trend bucketing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Look-back window of a metrics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last24Hours => "24h",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
        }
    }

    pub fn hours(&self) -> i64 {
        match self {
            Self::Last24Hours => 24,
            Self::Last7Days => 168,
            Self::Last30Days => 720,
            Self::Last90Days => 2160,
        }
    }

    /// Parse a query value; missing or unknown values mean the last 24 hours
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("24h") | None => Self::Last24Hours,
            Some("7d") => Self::Last7Days,
            Some("30d") => Self::Last30Days,
            Some("90d") => Self::Last90Days,
            Some(other) => {
                tracing::debug!(time_range = other, "Unknown time range, using 24h");
                Self::Last24Hours
            }
        }
    }

    /// Start of the window ending at `now`
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.hours())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trend bucket granularity (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Day,
    Hour,
}

impl GroupBy {
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("hour") => Self::Hour,
            _ => Self::Day,
        }
    }

    /// `YYYY-MM-DD` for days, `YYYY-MM-DDTHH:00:00Z` for hours
    pub fn bucket_key(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Day => at.format("%Y-%m-%d").to_string(),
            Self::Hour => at.format("%Y-%m-%dT%H:00:00Z").to_string(),
        }
    }
}
