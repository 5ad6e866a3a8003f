//! Repository traits for the account store and the outcome recorder

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::account::{Account, NewAccount, RunRecord};
use super::outcome::{
    DailyOutcomeCounts, NewOutcome, OutcomeQuery, OutcomeRecord, OutcomeStats, OutcomeSummary,
};

/// Keyed store over account records.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Active accounts in store order (ascending id).
    async fn list_active(&self) -> Result<Vec<Account>>;

    async fn list_all(&self) -> Result<Vec<Account>>;

    async fn get(&self, id: i64) -> Result<Option<Account>>;

    async fn find_by_login(&self, login: &str) -> Result<Option<Account>>;

    async fn create(&self, account: NewAccount) -> Result<Account>;

    /// Returns `false` when no account has this id.
    async fn set_active(&self, id: i64, active: bool) -> Result<bool>;

    async fn update_secret(&self, id: i64, encrypted_secret: &str) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Persist the `Running` label before the site driver is invoked.
    async fn mark_running(&self, id: i64) -> Result<()>;

    /// Write back status and timestamps once an account has been processed.
    async fn record_run(&self, id: i64, record: &RunRecord) -> Result<()>;
}

/// Append-only store of outcome records.
#[async_trait]
pub trait OutcomeRepository: Send + Sync {
    async fn append(&self, outcome: NewOutcome) -> Result<OutcomeRecord>;

    async fn query(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeRecord>>;

    /// Per-kind counts, average duration and the ten newest records in the window.
    async fn summary(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<OutcomeSummary>;

    /// Totals, success rate, average duration and per-account counts.
    /// A `None` bound leaves that side of the window open.
    async fn stats(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<OutcomeStats>;

    /// Per-kind counts per UTC day, newest first; days without records are absent.
    async fn daily_counts(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DailyOutcomeCounts>>;
}
