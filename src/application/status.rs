//! Read-only status snapshot of the controller and the account store

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::run_state::RunFlags;
use super::schedule::WeeklySchedule;
use crate::domain::{Account, AccountStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingAccount {
    pub account_id: i64,
    pub login: String,
    pub status: AccountStatus,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub scheduler_active: bool,
    pub batch_active: bool,
    pub automation_active: bool,
    pub stop_requested: bool,
    pub batch_started_at: Option<DateTime<Utc>>,
    pub next_scheduled_run: Option<DateTime<Utc>>,
    pub schedule: String,
    pub active_accounts: usize,
    pub accounts_by_status: BTreeMap<String, usize>,
    pub currently_processing: Option<ProcessingAccount>,
    pub summary: String,
}

impl StatusSnapshot {
    /// Combines controller flags with a fresh read of the active accounts.
    /// The batch may be changing statuses while this runs; a slightly stale
    /// view is fine.
    pub fn compose(
        flags: RunFlags,
        schedule: &WeeklySchedule,
        now: DateTime<Utc>,
        active_accounts: &[Account],
    ) -> Self {
        let mut accounts_by_status = BTreeMap::new();
        for account in active_accounts {
            *accounts_by_status
                .entry(account.status.to_string())
                .or_insert(0) += 1;
        }

        // A Running row left behind by a crashed process is not live work.
        let currently_processing = if flags.batch_active {
            active_accounts
                .iter()
                .find(|account| account.status == AccountStatus::Running)
                .map(|account| ProcessingAccount {
                    account_id: account.id,
                    login: account.login.clone(),
                    status: account.status.clone(),
                    last_run_at: account.last_run_at,
                })
        } else {
            None
        };

        let summary = format!(
            "Scheduler: {}, Task: {}, Profiles: {}",
            if flags.scheduler_active { "Running" } else { "Stopped" },
            if flags.batch_active { "Running" } else { "Idle" },
            active_accounts.len()
        );

        Self {
            scheduler_active: flags.scheduler_active,
            batch_active: flags.batch_active,
            automation_active: flags.scheduler_active || flags.batch_active,
            stop_requested: flags.stop_requested,
            batch_started_at: flags.batch_started_at,
            next_scheduled_run: flags
                .scheduler_active
                .then(|| schedule.next_after(now)),
            schedule: schedule.to_string(),
            active_accounts: active_accounts.len(),
            accounts_by_status,
            currently_processing,
            summary,
        }
    }
}
