use crate::domain::{DomainError, DomainResult};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device id recorded when the device omits one
pub const UNKNOWN_DEVICE_ID: &str = "unknown-device";

/// Direction of a punch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogType {
    In,
    Out,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::In => "IN",
            LogType::Out => "OUT",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(LogType::In),
            "OUT" => Ok(LogType::Out),
            other => Err(format!("unknown log type: {}", other)),
        }
    }
}

/// A punch record as reported by the device, after parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub device_transaction_id: Option<String>,
    pub employee_code: String,
    pub punch_time: DateTime<Utc>,
    pub log_type: LogType,
    pub device_id: String,
}

/// A device record that could not be parsed into a RawTransaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRecord {
    pub device_transaction_id: Option<String>,
    pub reason: String,
}

/// Result of one fetch against the device, across all pages
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionBatch {
    pub url: String,
    pub status_code: u16,
    pub transactions: Vec<RawTransaction>,
    pub malformed: Vec<MalformedRecord>,
    /// More pages were offered than the client is allowed to follow
    pub truncated: bool,
}

impl TransactionBatch {
    pub fn new(url: String, status_code: u16) -> Self {
        Self {
            url,
            status_code,
            ..Default::default()
        }
    }

    /// Every record the device returned, including malformed ones
    pub fn fetched_count(&self) -> usize {
        self.transactions.len() + self.malformed.len()
    }
}

/// Half-open time range `[start, end)` used to query the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window covering today in the device's local time, extended back by
    /// `lookback_days` whole days.
    pub fn local_days(now: DateTime<Utc>, offset: FixedOffset, lookback_days: u32) -> Self {
        let local_today = now.with_timezone(&offset).date_naive();
        let first_day = local_today - Duration::days(i64::from(lookback_days));
        let start = local_midnight(first_day, offset);
        let end = local_midnight(local_today + Duration::days(1), offset);
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Device clock offset from UTC, in minutes east
pub fn utc_offset_from_minutes(minutes: i32) -> DomainResult<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| DomainError::ValidationError(format!("invalid UTC offset: {} minutes", minutes)))
}

fn local_midnight(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = day.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(offset.local_minus_utc()))))
}
