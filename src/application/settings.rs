//! Runtime settings consumed by the maintenance controller

use std::time::Duration;

use super::retry::RetryPolicy;
use super::schedule::WeeklySchedule;

pub mod defaults {
    pub const INTER_ACCOUNT_DELAY_SECS: u64 = 15;
    pub const RESCHEDULE_AFTER_DAYS: i64 = 7;
}

#[derive(Debug, Clone)]
pub struct MaintenanceSettings {
    pub schedule: WeeklySchedule,
    pub retry: RetryPolicy,
    /// Pause between two accounts of one batch.
    pub inter_account_delay: Duration,
    /// Added to "now" for `next_run_at` after a successful run.
    pub reschedule_after: chrono::Duration,
    /// Where failure and summary notifications go. `None` disables them.
    pub operator_email: Option<String>,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            schedule: WeeklySchedule::default(),
            retry: RetryPolicy::default(),
            inter_account_delay: Duration::from_secs(defaults::INTER_ACCOUNT_DELAY_SECS),
            reschedule_after: chrono::Duration::days(defaults::RESCHEDULE_AFTER_DAYS),
            operator_email: None,
        }
    }
}
