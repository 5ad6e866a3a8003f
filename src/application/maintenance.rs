//! Maintenance controller
//!
//! Owns the scheduler and batch lifecycle. A single instance is built by
//! the composition root and shared (it is cheap to clone) with the control
//! surface. All operations are non-blocking except `run_batch`, which runs a
//! batch to completion on the caller's task.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch::{BatchRunner, BatchSummary};
use super::notifications;
use super::run_state::{BatchGuard, RunFlags, RunState};
use super::settings::MaintenanceSettings;
use super::status::StatusSnapshot;
use crate::domain::{
    Account, AccountRepository, DailyOutcomeCounts, Notifier, OutcomeQuery, OutcomeRecord,
    OutcomeRepository, OutcomeStats, OutcomeSummary, SecretVault, SiteDriver,
};

const WEEK_DAYS: i64 = 7;

/// Collaborators the controller drives.
#[derive(Clone)]
pub struct MaintenanceServices {
    pub accounts: Arc<dyn AccountRepository>,
    pub outcomes: Arc<dyn OutcomeRepository>,
    pub driver: Arc<dyn SiteDriver>,
    pub notifier: Arc<dyn Notifier>,
    pub vault: Arc<dyn SecretVault>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartOutcome {
    Armed { next_run_at: DateTime<Utc> },
    AlreadyArmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopOutcome {
    Stopped {
        scheduler_disarmed: bool,
        batch_signalled: bool,
    },
    NotRunning,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("a maintenance batch is already running")]
    AlreadyRunning,
}

/// A batch started in the background by `run_now`.
#[derive(Debug)]
pub struct BatchHandle {
    started_at: DateTime<Utc>,
    join: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn wait(self) -> Result<BatchSummary> {
        self.join.await.context("maintenance batch task panicked")?
    }
}

#[derive(Clone)]
pub struct MaintenanceController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    services: MaintenanceServices,
    settings: MaintenanceSettings,
    state: Arc<RunState>,
}

impl MaintenanceController {
    pub fn new(services: MaintenanceServices, settings: MaintenanceSettings) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                services,
                settings,
                state: RunState::new(),
            }),
        }
    }

    pub fn settings(&self) -> &MaintenanceSettings {
        &self.inner.settings
    }

    pub fn flags(&self) -> RunFlags {
        self.inner.state.flags()
    }

    pub fn is_running(&self) -> bool {
        self.flags().batch_active
    }

    /// Arms the weekly trigger.
    pub fn start_schedule(&self) -> StartOutcome {
        let Some(token) = self.inner.state.arm_scheduler() else {
            info!("Automation scheduler is already running");
            return StartOutcome::AlreadyArmed;
        };

        let next_run_at = self.inner.settings.schedule.next_after(Utc::now());
        info!(
            "🚀 Weekly maintenance scheduled {}, next run at {}",
            self.inner.settings.schedule, next_run_at
        );

        let controller = self.clone();
        tokio::spawn(async move { controller.scheduler_loop(token).await });

        StartOutcome::Armed { next_run_at }
    }

    async fn scheduler_loop(self, token: CancellationToken) {
        loop {
            let now = Utc::now();
            let next = self.inner.settings.schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!("Scheduler sleeping {}s until {}", wait.as_secs(), next);

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            match self.run_now() {
                Ok(handle) => info!("⏰ Scheduled maintenance batch started at {}", handle.started_at()),
                Err(ControlError::AlreadyRunning) => {
                    warn!("⚠️ Scheduled trigger skipped, a maintenance batch is already running");
                }
            }
        }
        info!("🛑 Maintenance scheduler disarmed");
    }

    /// Disarms the trigger and signals a running batch to stop at its next
    /// safe point. Calling it with nothing running is a no-op.
    pub fn stop(&self) -> StopOutcome {
        let scheduler_disarmed = self.inner.state.disarm_scheduler();
        let batch_signalled = self.inner.state.request_stop();

        if !scheduler_disarmed && !batch_signalled {
            debug!("Stop requested but nothing is running");
            return StopOutcome::NotRunning;
        }
        info!(
            "🛑 Automation stopped (scheduler disarmed: {}, batch signalled: {})",
            scheduler_disarmed, batch_signalled
        );
        StopOutcome::Stopped {
            scheduler_disarmed,
            batch_signalled,
        }
    }

    /// Starts one batch in the background. Rejected, not queued, while
    /// another batch is running.
    pub fn run_now(&self) -> Result<BatchHandle, ControlError> {
        let guard = self
            .inner
            .state
            .try_begin_batch()
            .ok_or(ControlError::AlreadyRunning)?;
        let started_at = guard.started_at();

        let controller = self.clone();
        let join = tokio::spawn(async move { controller.execute(guard).await });
        Ok(BatchHandle { started_at, join })
    }

    /// Runs one batch on the current task.
    pub async fn run_batch(&self) -> Result<BatchSummary> {
        let guard = self
            .inner
            .state
            .try_begin_batch()
            .ok_or(ControlError::AlreadyRunning)?;
        self.execute(guard).await
    }

    async fn execute(&self, guard: BatchGuard) -> Result<BatchSummary> {
        info!("🚀 Starting weekly profile maintenance");
        let runner = BatchRunner::new(
            &self.inner.services,
            &self.inner.settings,
            guard.stop_token(),
        );
        let result = runner.run(guard.started_at()).await;
        drop(guard);

        match &result {
            Ok(summary) if summary.stopped_early => {
                info!(
                    "🛑 Maintenance stopped after {}/{} profiles, summary not sent",
                    summary.processed, summary.total_accounts
                );
            }
            Ok(summary) => {
                info!(
                    "📊 Maintenance finished: {} success, {} failure, {} no change in {:.1}s",
                    summary.success,
                    summary.failure,
                    summary.no_change,
                    summary.elapsed_secs()
                );
                self.send_summary(summary).await;
            }
            Err(e) => error!("❌ Maintenance batch aborted: {:#}", e),
        }
        result
    }

    async fn send_summary(&self, summary: &BatchSummary) {
        let Some(to) = self.inner.settings.operator_email.as_deref() else {
            debug!("No operator address configured, skipping summary notification");
            return;
        };
        let notification = notifications::summary_notification(to, summary);
        if let Err(e) = self.inner.services.notifier.deliver(&notification).await {
            warn!("⚠️ Summary notification was not delivered: {:#}", e);
        }
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let flags = self.flags();
        let active = self.inner.services.accounts.list_active().await?;
        Ok(StatusSnapshot::compose(
            flags,
            &self.inner.settings.schedule,
            Utc::now(),
            &active,
        ))
    }

    pub async fn recent_outcomes(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeRecord>> {
        self.inner.services.outcomes.query(query).await
    }

    pub async fn find_account(&self, login: &str) -> Result<Option<Account>> {
        self.inner.services.accounts.find_by_login(login).await
    }

    /// Outcome summary over the last `days` days.
    pub async fn outcome_summary(&self, days: u32) -> Result<OutcomeSummary> {
        let until = Utc::now();
        let since = until - chrono::Duration::days(i64::from(days));
        self.inner.services.outcomes.summary(since, until).await
    }

    /// Statistics over every recorded outcome.
    pub async fn outcome_stats(&self) -> Result<OutcomeStats> {
        self.inner.services.outcomes.stats(None, None).await
    }

    /// Statistics over the last seven days, with one breakdown entry per
    /// UTC day (today first), including days without records.
    pub async fn weekly_outcome_stats(&self) -> Result<OutcomeStats> {
        let outcomes = &self.inner.services.outcomes;
        let until = Utc::now();
        let since = until - chrono::Duration::days(WEEK_DAYS);

        let mut stats = outcomes.stats(Some(since), Some(until)).await?;
        let recorded = outcomes.daily_counts(since, until).await?;
        stats.daily_breakdown = (0..WEEK_DAYS)
            .map(|back| {
                let date = (until - chrono::Duration::days(back)).date_naive();
                recorded
                    .iter()
                    .find(|day| day.date == date)
                    .cloned()
                    .unwrap_or_else(|| DailyOutcomeCounts::empty(date))
            })
            .collect();
        Ok(stats)
    }
}
