//! Test utilities
//!
//! In-memory doubles for every capability the controller drives, plus an
//! in-memory SQLite database for repository tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::application::{MaintenanceController, MaintenanceServices, MaintenanceSettings};
use crate::domain::{
    Account, AccountRepository, AccountStatus, ChangedFields, Credentials, DailyOutcomeCounts,
    NewAccount, NewOutcome, Notification, Notifier, OutcomeKind, OutcomeQuery, OutcomeRecord,
    OutcomeRepository, OutcomeStats, OutcomeSummary, RunRecord, SecretVault, SiteDriver,
    SiteError,
};
use crate::infrastructure::DatabaseConnection;

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Fresh, migrated in-memory database.
    pub async fn new() -> Result<Self> {
        let connection = DatabaseConnection::in_memory().await?;
        connection.migrate().await?;
        Ok(Self { connection })
    }

    pub fn pool(&self) -> sqlx::SqlitePool {
        self.connection.pool().clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

#[derive(Default)]
pub struct InMemoryAccounts {
    rows: Mutex<Vec<Account>>,
    next_id: AtomicI64,
    record_run_fails: AtomicBool,
}

impl InMemoryAccounts {
    /// Makes every later `record_run` fail as a broken store would.
    pub fn fail_record_runs(&self) {
        self.record_run_fails.store(true, Ordering::SeqCst);
    }

    pub fn seed(&self, login: &str, active: bool) -> Account {
        self.seed_with_secret(login, active, &format!("plain:{login}-pw"))
    }

    pub fn seed_with_secret(&self, login: &str, active: bool, secret: &str) -> Account {
        let account = Account {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            login: login.to_string(),
            encrypted_secret: secret.to_string(),
            is_active: active,
            status: AccountStatus::Idle,
            last_run_at: None,
            last_success_at: None,
            next_run_at: None,
            notes: None,
            created_at: Utc::now(),
        };
        lock(&self.rows).push(account.clone());
        account
    }

    pub fn snapshot(&self, id: i64) -> Account {
        lock(&self.rows)
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .expect("account exists")
    }

    fn update<F: FnOnce(&mut Account)>(&self, id: i64, f: F) -> bool {
        let mut rows = lock(&self.rows);
        rows.iter_mut().find(|a| a.id == id).map(f).is_some()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccounts {
    async fn list_active(&self) -> Result<Vec<Account>> {
        Ok(lock(&self.rows).iter().filter(|a| a.is_active).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Account>> {
        Ok(lock(&self.rows).clone())
    }

    async fn get(&self, id: i64) -> Result<Option<Account>> {
        Ok(lock(&self.rows).iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<Account>> {
        Ok(lock(&self.rows).iter().find(|a| a.login == login).cloned())
    }

    async fn create(&self, account: NewAccount) -> Result<Account> {
        let created = self.seed_with_secret(&account.login, account.is_active, &account.encrypted_secret);
        Ok(created)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        Ok(self.update(id, |a| a.is_active = active))
    }

    async fn update_secret(&self, id: i64, encrypted_secret: &str) -> Result<bool> {
        Ok(self.update(id, |a| a.encrypted_secret = encrypted_secret.to_string()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|a| a.id != id);
        Ok(rows.len() != before)
    }

    async fn mark_running(&self, id: i64) -> Result<()> {
        if self.update(id, |a| a.status = AccountStatus::Running) {
            Ok(())
        } else {
            bail!("no account {id}")
        }
    }

    async fn record_run(&self, id: i64, record: &RunRecord) -> Result<()> {
        if self.record_run_fails.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        let found = self.update(id, |a| {
            a.status = record.status.clone();
            a.last_run_at = Some(record.ran_at);
            if let Some(at) = record.success_at {
                a.last_success_at = Some(at);
            }
            if let Some(at) = record.next_run_at {
                a.next_run_at = Some(at);
            }
        });
        if found { Ok(()) } else { bail!("no account {id}") }
    }
}

#[derive(Default)]
pub struct InMemoryOutcomes {
    rows: Mutex<Vec<OutcomeRecord>>,
}

impl InMemoryOutcomes {
    /// Records in append order.
    pub fn all(&self) -> Vec<OutcomeRecord> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl OutcomeRepository for InMemoryOutcomes {
    async fn append(&self, outcome: NewOutcome) -> Result<OutcomeRecord> {
        let mut rows = lock(&self.rows);
        let record = OutcomeRecord {
            id: i64::try_from(rows.len())? + 1,
            account_id: outcome.account_id,
            account_login: None,
            kind: outcome.kind,
            duration_ms: outcome.duration_ms,
            changed_fields: outcome.changed_fields,
            detail: outcome.detail,
            executed_at: outcome.executed_at,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn query(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeRecord>> {
        let rows = lock(&self.rows);
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn summary(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<OutcomeSummary> {
        let window = OutcomeQuery {
            since: Some(since),
            until: Some(until),
            ..OutcomeQuery::default()
        };
        let records = self.query(&window).await?;
        let mut summary = OutcomeSummary {
            since: Some(since),
            until: Some(until),
            ..OutcomeSummary::default()
        };
        for kind in OutcomeKind::ALL {
            let count = records.iter().filter(|r| r.kind == kind).count() as u64;
            summary.add_count(kind, count);
        }
        summary.recent = records.into_iter().take(10).collect();
        Ok(summary)
    }

    async fn stats(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<OutcomeStats> {
        let window = OutcomeQuery {
            since,
            until,
            ..OutcomeQuery::default()
        };
        let mut records = self.query(&window).await?;
        records.sort_by_key(|r| r.account_id);

        let mut stats = OutcomeStats::new(since, until);
        for record in &records {
            stats.add(record.account_id, record.account_login.clone(), record.kind, 1);
        }
        #[allow(clippy::cast_precision_loss)]
        let average = (!records.is_empty()).then(|| {
            records.iter().map(|r| r.duration_ms as f64).sum::<f64>() / records.len() as f64
        });
        stats.finish(average);
        Ok(stats)
    }

    async fn daily_counts(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DailyOutcomeCounts>> {
        let window = OutcomeQuery {
            since: Some(since),
            until: Some(until),
            ..OutcomeQuery::default()
        };
        let mut days: Vec<DailyOutcomeCounts> = Vec::new();
        for record in self.query(&window).await? {
            let date = record.executed_at.date_naive();
            match days.iter_mut().find(|d| d.date == date) {
                Some(day) => day.counts.add(record.kind, 1),
                None => {
                    let mut day = DailyOutcomeCounts::empty(date);
                    day.counts.add(record.kind, 1);
                    days.push(day);
                }
            }
        }
        days.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(days)
    }
}

/// Pauses one driver call until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Site driver replaying a scripted result per call. The last scripted
/// result repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedDriver {
    scripts: Mutex<HashMap<String, Vec<Result<ChangedFields, SiteError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
}

impl ScriptedDriver {
    pub fn script(&self, login: &str, results: Vec<Result<ChangedFields, SiteError>>) {
        lock(&self.scripts).insert(login.to_string(), results);
    }

    /// Holds the next call for `login` until `release` is notified.
    pub fn gate(&self, login: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        lock(&self.gates).insert(login.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self, login: &str) -> usize {
        lock(&self.calls).get(login).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SiteDriver for ScriptedDriver {
    async fn refresh_profile(
        &self,
        credentials: &Credentials,
        _stop: &CancellationToken,
    ) -> Result<ChangedFields, SiteError> {
        let login = credentials.login.as_str();
        let call_index = {
            let mut calls = lock(&self.calls);
            let entry = calls.entry(login.to_string()).or_insert(0);
            *entry += 1;
            *entry - 1
        };

        let gate = lock(&self.gates).remove(login);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let scripts = lock(&self.scripts);
        let script = scripts
            .get(login)
            .ok_or_else(|| SiteError::Unclassified(format!("no script for {login}")))?;
        script
            .get(call_index.min(script.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| Err(SiteError::Unclassified("empty script".into())))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: AtomicBool::new(true),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("relay unavailable"));
        }
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

/// Stores secrets as `plain:<secret>`.
pub struct PlainVault;

impl PlainVault {
    pub const CORRUPT: &'static str = "corrupt";
}

impl SecretVault for PlainVault {
    fn seal(&self, plaintext: &str) -> Result<String> {
        Ok(format!("plain:{plaintext}"))
    }

    fn open(&self, sealed: &str) -> Result<String> {
        sealed
            .strip_prefix("plain:")
            .map(str::to_string)
            .ok_or_else(|| anyhow!("not a sealed secret"))
    }
}

/// Controller wired to fresh doubles, with an operator address set.
pub struct Harness {
    pub accounts: Arc<InMemoryAccounts>,
    pub outcomes: Arc<InMemoryOutcomes>,
    pub driver: Arc<ScriptedDriver>,
    pub notifier: Arc<RecordingNotifier>,
    pub controller: MaintenanceController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(MaintenanceSettings {
            operator_email: Some("ops@example.com".into()),
            ..MaintenanceSettings::default()
        })
    }

    pub fn with_settings(settings: MaintenanceSettings) -> Self {
        let accounts = Arc::new(InMemoryAccounts::default());
        let outcomes = Arc::new(InMemoryOutcomes::default());
        let driver = Arc::new(ScriptedDriver::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = MaintenanceController::new(
            MaintenanceServices {
                accounts: accounts.clone(),
                outcomes: outcomes.clone(),
                driver: driver.clone(),
                notifier: notifier.clone(),
                vault: Arc::new(PlainVault),
            },
            settings,
        );
        Self {
            accounts,
            outcomes,
            driver,
            notifier,
            controller,
        }
    }
}
