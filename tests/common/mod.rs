//! Shared wiring for integration tests: real SQLite stores and vault,
//! scripted site driver and an in-memory notifier.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use profile_maintainer_lib::application::RetryPolicy;
use profile_maintainer_lib::domain::{
    Account, AccountRepository, ChangedFields, Credentials, FieldChange, NewAccount, Notification,
    Notifier, SecretVault, SiteDriver, SiteError,
};
use profile_maintainer_lib::infrastructure::{
    ChaChaSecretVault, DatabaseConnection, SqliteAccountRepository, SqliteOutcomeRepository,
};
use profile_maintainer_lib::{MaintenanceController, MaintenanceServices, MaintenanceSettings};

pub const OPERATOR: &str = "ops@example.com";

/// Replays queued results per login; an empty queue means "nothing to change".
#[derive(Default)]
pub struct QueueDriver {
    queues: Mutex<HashMap<String, VecDeque<Result<ChangedFields, SiteError>>>>,
    passwords: Mutex<Vec<String>>,
    pub called: Notify,
}

impl QueueDriver {
    pub fn push(&self, login: &str, result: Result<ChangedFields, SiteError>) {
        self.queues
            .lock()
            .unwrap()
            .entry(login.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn passwords(&self) -> Vec<String> {
        self.passwords.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteDriver for QueueDriver {
    async fn refresh_profile(
        &self,
        credentials: &Credentials,
        _stop: &CancellationToken,
    ) -> Result<ChangedFields, SiteError> {
        self.passwords.lock().unwrap().push(credentials.password.clone());
        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&credentials.login)
            .and_then(VecDeque::pop_front);
        self.called.notify_one();
        next.unwrap_or_else(|| Ok(ChangedFields::new()))
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.subject.clone())
            .collect()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.to.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn bio_change() -> ChangedFields {
    let mut fields = ChangedFields::new();
    fields.insert(
        "personal_statement".into(),
        FieldChange::new("Old statement", "New statement"),
    );
    fields
}

/// Millisecond-scale settings so real-time tests stay fast.
pub fn fast_settings() -> MaintenanceSettings {
    MaintenanceSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            short_backoff: Duration::from_millis(20),
            long_backoff: Duration::from_millis(40),
        },
        inter_account_delay: Duration::from_millis(5),
        operator_email: Some(OPERATOR.to_string()),
        ..MaintenanceSettings::default()
    }
}

pub struct Stack {
    pub db: DatabaseConnection,
    pub accounts: Arc<SqliteAccountRepository>,
    pub outcomes: Arc<SqliteOutcomeRepository>,
    pub driver: Arc<QueueDriver>,
    pub notifier: Arc<CollectingNotifier>,
    pub vault: Arc<ChaChaSecretVault>,
    pub controller: MaintenanceController,
}

impl Stack {
    pub async fn new(settings: MaintenanceSettings) -> Self {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let accounts = Arc::new(SqliteAccountRepository::new(db.pool().clone()));
        let outcomes = Arc::new(SqliteOutcomeRepository::new(db.pool().clone()));
        let driver = Arc::new(QueueDriver::default());
        let notifier = Arc::new(CollectingNotifier::default());
        let vault = Arc::new(
            ChaChaSecretVault::from_base64_key(&ChaChaSecretVault::generate_key()).unwrap(),
        );

        let controller = MaintenanceController::new(
            MaintenanceServices {
                accounts: accounts.clone(),
                outcomes: outcomes.clone(),
                driver: driver.clone(),
                notifier: notifier.clone(),
                vault: vault.clone(),
            },
            settings,
        );

        Self {
            db,
            accounts,
            outcomes,
            driver,
            notifier,
            vault,
            controller,
        }
    }

    /// Stores an account whose password is `{login}-secret`.
    pub async fn add_account(&self, login: &str, active: bool) -> Account {
        let sealed = self.vault.seal(&format!("{login}-secret")).unwrap();
        self.add_account_with_secret(login, active, sealed).await
    }

    pub async fn add_account_with_secret(&self, login: &str, active: bool, secret: String) -> Account {
        self.accounts
            .create(NewAccount {
                login: login.to_string(),
                encrypted_secret: secret,
                is_active: active,
                notes: None,
            })
            .await
            .unwrap()
    }

    pub async fn account(&self, id: i64) -> Account {
        self.accounts.get(id).await.unwrap().unwrap()
    }
}
