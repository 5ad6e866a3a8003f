//! Outcome records written once per processed account

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of one account's processing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutcomeKind {
    Success,
    Failure,
    NoChange,
    Warning,
}

impl OutcomeKind {
    pub const ALL: [Self; 4] = [Self::Success, Self::Failure, Self::NoChange, Self::Warning];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::NoChange => "NoChange",
            Self::Warning => "Warning",
        }
    }

    /// Log level shown next to the record on the control surface.
    pub const fn level(self) -> &'static str {
        match self {
            Self::Success | Self::NoChange => "INFO",
            Self::Failure => "ERROR",
            Self::Warning => "WARNING",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown outcome kind '{0}', expected one of Success, Failure, NoChange, Warning")]
pub struct UnknownOutcomeKind(pub String);

impl FromStr for OutcomeKind {
    type Err = UnknownOutcomeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownOutcomeKind(s.to_string()))
    }
}

/// Before/after value of one edited profile field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: String,
    pub new: String,
}

impl FieldChange {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Field name to change, ordered so record payloads are stable.
pub type ChangedFields = BTreeMap<String, FieldChange>;

/// An outcome about to be appended.
#[derive(Debug, Clone)]
pub struct NewOutcome {
    pub account_id: i64,
    pub kind: OutcomeKind,
    pub duration_ms: u64,
    pub changed_fields: ChangedFields,
    pub detail: String,
    pub executed_at: DateTime<Utc>,
}

/// An appended, immutable outcome record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: i64,
    pub account_id: i64,
    /// Login of the account at query time, when the store can resolve it.
    pub account_login: Option<String>,
    pub kind: OutcomeKind,
    pub duration_ms: u64,
    pub changed_fields: ChangedFields,
    pub detail: String,
    pub executed_at: DateTime<Utc>,
}

/// Filter for reading outcome records back, newest first.
#[derive(Debug, Clone, Default)]
pub struct OutcomeQuery {
    pub account_id: Option<i64>,
    pub kind: Option<OutcomeKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl OutcomeQuery {
    pub fn recent(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &OutcomeRecord) -> bool {
        self.account_id.is_none_or(|id| id == record.account_id)
            && self.kind.is_none_or(|kind| kind == record.kind)
            && self.since.is_none_or(|since| record.executed_at >= since)
            && self.until.is_none_or(|until| record.executed_at <= until)
    }
}

/// Aggregate view of outcomes inside a time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub no_change: u64,
    pub warning: u64,
    pub average_duration_ms: Option<f64>,
    pub recent: Vec<OutcomeRecord>,
}

impl OutcomeSummary {
    pub fn add_count(&mut self, kind: OutcomeKind, count: u64) {
        match kind {
            OutcomeKind::Success => self.success += count,
            OutcomeKind::Failure => self.failure += count,
            OutcomeKind::NoChange => self.no_change += count,
            OutcomeKind::Warning => self.warning += count,
        }
        self.total += count;
    }
}

/// Per-kind tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub no_change: u64,
    pub warning: u64,
}

impl OutcomeCounts {
    pub fn add(&mut self, kind: OutcomeKind, count: u64) {
        match kind {
            OutcomeKind::Success => self.success += count,
            OutcomeKind::Failure => self.failure += count,
            OutcomeKind::NoChange => self.no_change += count,
            OutcomeKind::Warning => self.warning += count,
        }
        self.total += count;
    }

    /// Successes as a percentage of all records, two decimals. Zero when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        two_decimals(self.success as f64 / self.total as f64 * 100.0)
    }
}

fn two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOutcomeCounts {
    pub account_id: i64,
    pub account_login: Option<String>,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
}

/// Tallies for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOutcomeCounts {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
}

impl DailyOutcomeCounts {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            counts: OutcomeCounts::default(),
        }
    }
}

/// Outcome statistics over an optional window, broken down per account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub success_rate_percentage: f64,
    pub average_duration_ms: Option<f64>,
    /// Ordered by account id.
    pub per_account: Vec<AccountOutcomeCounts>,
    /// Filled only for the weekly view, newest day first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub daily_breakdown: Vec<DailyOutcomeCounts>,
}

impl OutcomeStats {
    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            since,
            until,
            ..Self::default()
        }
    }

    /// Counts `count` records of `kind` for one account. Callers feed rows
    /// grouped by account so each account lands in one entry.
    pub fn add(&mut self, account_id: i64, account_login: Option<String>, kind: OutcomeKind, count: u64) {
        self.counts.add(kind, count);
        match self.per_account.last_mut() {
            Some(entry) if entry.account_id == account_id => entry.counts.add(kind, count),
            _ => {
                let mut counts = OutcomeCounts::default();
                counts.add(kind, count);
                self.per_account.push(AccountOutcomeCounts {
                    account_id,
                    account_login,
                    counts,
                });
            }
        }
    }

    /// Sets the derived fields once every row has been added.
    pub fn finish(&mut self, average_duration_ms: Option<f64>) {
        self.success_rate_percentage = self.counts.success_rate_percentage();
        self.average_duration_ms = average_duration_ms.map(two_decimals);
    }
}
