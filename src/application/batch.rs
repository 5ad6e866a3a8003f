//! One sweep over the active accounts
//!
//! Accounts are processed strictly in store order, one at a time. The stop
//! token is checked before each account and during the pause between
//! accounts; it is also handed to the retry loop and the site driver.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::MaintenanceServices;
use super::notifications;
use super::retry::{RetryFailure, retry_with_backoff};
use super::settings::MaintenanceSettings;
use crate::domain::{
    Account, AccountStatus, ChangedFields, Credentials, NewOutcome, OutcomeKind, RunRecord,
};

/// Totals for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Active accounts when the batch began.
    pub total_accounts: usize,
    /// Accounts that were reached before any stop.
    pub processed: usize,
    pub success: usize,
    pub failure: usize,
    pub no_change: usize,
    pub warning: usize,
    pub stopped_early: bool,
}

impl BatchSummary {
    fn empty(started_at: DateTime<Utc>, total_accounts: usize) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            total_accounts,
            processed: 0,
            success: 0,
            failure: 0,
            no_change: 0,
            warning: 0,
            stopped_early: false,
        }
    }

    fn count(&mut self, kind: OutcomeKind) {
        self.processed += 1;
        match kind {
            OutcomeKind::Success => self.success += 1,
            OutcomeKind::Failure => self.failure += 1,
            OutcomeKind::NoChange => self.no_change += 1,
            OutcomeKind::Warning => self.warning += 1,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_accounts == 0 {
            0.0
        } else {
            self.success as f64 / self.total_accounts as f64
        }
    }
}

/// Result of processing one account, before it is written anywhere.
#[derive(Debug)]
struct AccountResult {
    kind: OutcomeKind,
    changed_fields: ChangedFields,
    detail: String,
}

impl AccountResult {
    fn from_changes(login: &str, changed_fields: ChangedFields) -> Self {
        if changed_fields.is_empty() {
            return Self {
                kind: OutcomeKind::NoChange,
                changed_fields,
                detail: format!(
                    "Profile {login} maintenance completed successfully! \
                     No updates needed (content already optimal)"
                ),
            };
        }
        let names: Vec<&str> = changed_fields.keys().map(String::as_str).collect();
        Self {
            kind: OutcomeKind::Success,
            detail: format!(
                "Profile {login} maintenance completed successfully! Updated fields: {}",
                names.join(", ")
            ),
            changed_fields,
        }
    }

    fn failure(detail: String) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            changed_fields: ChangedFields::new(),
            detail,
        }
    }

    const fn status(&self) -> AccountStatus {
        match self.kind {
            OutcomeKind::Success => AccountStatus::Completed,
            OutcomeKind::NoChange => AccountStatus::NoChange,
            OutcomeKind::Failure | OutcomeKind::Warning => AccountStatus::Error,
        }
    }

    const fn succeeded(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success | OutcomeKind::NoChange)
    }
}

pub(crate) struct BatchRunner<'a> {
    services: &'a MaintenanceServices,
    settings: &'a MaintenanceSettings,
    stop: &'a CancellationToken,
}

impl<'a> BatchRunner<'a> {
    pub(crate) const fn new(
        services: &'a MaintenanceServices,
        settings: &'a MaintenanceSettings,
        stop: &'a CancellationToken,
    ) -> Self {
        Self {
            services,
            settings,
            stop,
        }
    }

    pub(crate) async fn run(&self, started_at: DateTime<Utc>) -> Result<BatchSummary> {
        let accounts = self.services.accounts.list_active().await?;
        let mut summary = BatchSummary::empty(started_at, accounts.len());
        info!("📋 Found {} active profiles to process", accounts.len());

        for (index, account) in accounts.iter().enumerate() {
            if self.stop.is_cancelled() {
                info!(
                    "🛑 Stop requested, leaving {} profile(s) untouched",
                    accounts.len() - index
                );
                break;
            }

            info!(
                "🔄 Processing profile {}/{}: {}",
                index + 1,
                accounts.len(),
                account.login
            );
            let kind = self.process_account(account).await;
            summary.count(kind);

            let is_last = index + 1 == accounts.len();
            if !is_last && self.pause_between_accounts().await {
                info!("🛑 Stop requested during pause between profiles");
                break;
            }
        }

        summary.stopped_early = self.stop.is_cancelled();
        summary.finished_at = Utc::now();
        Ok(summary)
    }

    /// Returns `true` if the pause was cut short by a stop request.
    async fn pause_between_accounts(&self) -> bool {
        let delay = self.settings.inter_account_delay;
        debug!("⏳ Waiting {}s before the next profile", delay.as_secs());
        tokio::select! {
            biased;
            () = self.stop.cancelled() => true,
            () = tokio::time::sleep(delay) => false,
        }
    }

    /// Processes one account end to end and returns the kind it was counted as.
    /// Never fails: store and notifier errors are logged and folded into the result.
    async fn process_account(&self, account: &Account) -> OutcomeKind {
        let started = tokio::time::Instant::now();

        let result = match self.services.accounts.mark_running(account.id).await {
            Ok(()) => self.drive(account).await,
            Err(e) => {
                error!("❌ Could not mark profile {} as running: {:#}", account.login, e);
                AccountResult::failure(format!(
                    "Unexpected error for profile {}: {e:#}",
                    account.login
                ))
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let now = Utc::now();

        let record = RunRecord {
            status: result.status(),
            ran_at: now,
            success_at: result.succeeded().then_some(now),
            next_run_at: result
                .succeeded()
                .then(|| now + self.settings.reschedule_after),
        };
        let AccountResult {
            mut kind,
            changed_fields,
            mut detail,
        } = result;
        if let Err(e) = self.services.accounts.record_run(account.id, &record).await {
            error!("❌ Could not record run for profile {}: {:#}", account.login, e);
            kind = OutcomeKind::Failure;
            detail = format!(
                "Unexpected error for profile {}: could not record the run: {e:#}",
                account.login
            );
        }

        let outcome = NewOutcome {
            account_id: account.id,
            kind,
            duration_ms,
            changed_fields,
            detail: detail.clone(),
            executed_at: now,
        };
        if let Err(e) = self.services.outcomes.append(outcome).await {
            error!("❌ Could not append outcome for profile {}: {:#}", account.login, e);
            kind = OutcomeKind::Failure;
            detail = format!(
                "Unexpected error for profile {}: could not store the outcome ({detail}): {e:#}",
                account.login
            );
        }

        match kind {
            OutcomeKind::Success | OutcomeKind::NoChange => {
                info!("✅ {} ({}ms)", detail, duration_ms);
            }
            OutcomeKind::Failure | OutcomeKind::Warning => {
                warn!("❌ {} ({}ms)", detail, duration_ms);
                self.notify_failure(account, &detail, now).await;
            }
        }

        kind
    }

    async fn drive(&self, account: &Account) -> AccountResult {
        let password = match self.services.vault.open(&account.encrypted_secret) {
            Ok(password) => password,
            Err(e) => {
                warn!("⚠️ Secret for profile {} could not be opened: {:#}", account.login, e);
                return AccountResult::failure(format!(
                    "Login failed for profile {}: Stored secret could not be decrypted",
                    account.login
                ));
            }
        };
        let credentials = Credentials {
            login: account.login.clone(),
            password,
        };

        let label = format!("profile {}", account.login);
        let driver = &self.services.driver;
        let stop = self.stop;
        let creds = &credentials;
        let outcome = retry_with_backoff(&self.settings.retry, stop, &label, |attempt| async move {
            debug!("Attempt {} for profile {}", attempt, creds.login);
            driver.refresh_profile(creds, stop).await
        })
        .await;

        match outcome {
            Ok(changed_fields) => AccountResult::from_changes(&account.login, changed_fields),
            Err(failure @ RetryFailure::Stopped { .. }) => AccountResult::failure(format!(
                "Maintenance stopped by operator for profile {} after {} attempt(s): {}",
                account.login,
                failure.attempts(),
                failure.error().operator_message(&account.login)
            )),
            Err(failure @ RetryFailure::Exhausted { .. }) => {
                AccountResult::failure(failure.error().operator_message(&account.login))
            }
        }
    }

    async fn notify_failure(&self, account: &Account, detail: &str, at: DateTime<Utc>) {
        let Some(to) = self.settings.operator_email.as_deref() else {
            debug!("No operator address configured, skipping failure notification");
            return;
        };
        let notification =
            notifications::failure_notification(to, &account.login, account.id, detail, at);
        if let Err(e) = self.services.notifier.deliver(&notification).await {
            warn!(
                "⚠️ Failure notification for profile {} was not delivered: {:#}",
                account.login, e
            );
        }
    }
}
