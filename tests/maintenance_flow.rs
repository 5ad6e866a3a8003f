//! End-to-end maintenance batches over the SQLite stores.

mod common;

use std::time::{Duration, Instant};

use chrono::Utc;

use common::{OPERATOR, Stack, bio_change, fast_settings};
use profile_maintainer_lib::domain::{
    AccountStatus, LoginFailure, OutcomeKind, OutcomeQuery, OutcomeRepository, SecretVault,
    SiteError,
};
use profile_maintainer_lib::infrastructure::ChaChaSecretVault;

#[tokio::test]
async fn batch_updates_accounts_and_records_outcomes() {
    let stack = Stack::new(fast_settings()).await;
    let alpha = stack.add_account("alpha", true).await;
    let bravo = stack.add_account("bravo", true).await;
    let charlie = stack.add_account("charlie", false).await;
    stack.driver.push("alpha", Ok(bio_change()));

    let before = Utc::now();
    let summary = stack.controller.run_batch().await.unwrap();

    assert_eq!(summary.total_accounts, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.no_change, 1);
    assert!(!summary.stopped_early);

    // Secrets reached the driver decrypted, in store order.
    assert_eq!(stack.driver.passwords(), vec!["alpha-secret", "bravo-secret"]);

    let alpha = stack.account(alpha.id).await;
    assert_eq!(alpha.status, AccountStatus::Completed);
    // Stored timestamps keep millisecond precision.
    let next = alpha.next_run_at.unwrap();
    assert!(next >= before + chrono::Duration::days(7) - chrono::Duration::milliseconds(1));
    assert!(alpha.last_success_at.is_some());

    assert_eq!(stack.account(bravo.id).await.status, AccountStatus::NoChange);

    let charlie = stack.account(charlie.id).await;
    assert_eq!(charlie.status, AccountStatus::Idle);
    assert!(charlie.last_run_at.is_none());

    let records = stack.outcomes.query(&OutcomeQuery::default()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].account_login.as_deref(), Some("bravo"));
    assert_eq!(records[0].kind, OutcomeKind::NoChange);
    assert_eq!(records[1].kind, OutcomeKind::Success);
    assert_eq!(
        records[1].detail,
        "Profile alpha maintenance completed successfully! Updated fields: personal_statement"
    );
    assert!(records[1].changed_fields.contains_key("personal_statement"));

    let subjects = stack.notifier.subjects();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].starts_with("Profile Automation Summary - "));
}

#[tokio::test]
async fn exhausted_retries_leave_success_fields_alone() {
    let stack = Stack::new(fast_settings()).await;
    let alpha = stack.add_account("alpha", true).await;
    for _ in 0..3 {
        stack
            .driver
            .push("alpha", Err(SiteError::ElementNotFound("#bio".into())));
    }

    let started = Instant::now();
    let summary = stack.controller.run_batch().await.unwrap();

    // 1 * 20ms + 2 * 20ms of backoff on the short unit.
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(summary.failure, 1);

    let alpha = stack.account(alpha.id).await;
    assert_eq!(alpha.status, AccountStatus::Error);
    assert!(alpha.last_run_at.is_some());
    assert!(alpha.last_success_at.is_none());
    assert!(alpha.next_run_at.is_none());

    let records = stack.outcomes.query(&OutcomeQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, OutcomeKind::Failure);
    assert_eq!(
        records[0].detail,
        "Website structure changed for profile alpha: Required elements not found"
    );

    let subjects = stack.notifier.subjects();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0], "Profile Automation Failed - alpha");
    assert!(subjects[1].starts_with("Profile Automation Summary - "));
}

#[tokio::test]
async fn recovery_on_a_later_attempt_counts_as_success() {
    let stack = Stack::new(fast_settings()).await;
    let alpha = stack.add_account("alpha", true).await;
    stack.driver.push(
        "alpha",
        Err(SiteError::Login(LoginFailure::StillOnLoginPage)),
    );
    stack.driver.push("alpha", Ok(bio_change()));

    let summary = stack.controller.run_batch().await.unwrap();

    assert_eq!(summary.success, 1);
    assert_eq!(stack.driver.passwords().len(), 2);
    assert_eq!(stack.account(alpha.id).await.status, AccountStatus::Completed);
    let records = stack.outcomes.query(&OutcomeQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, OutcomeKind::Success);
}

#[tokio::test]
async fn stop_during_backoff_ends_the_batch_early() {
    let mut settings = fast_settings();
    settings.retry.long_backoff = Duration::from_secs(30);
    let stack = Stack::new(settings).await;
    let alpha = stack.add_account("alpha", true).await;
    let bravo = stack.add_account("bravo", true).await;
    stack
        .driver
        .push("alpha", Err(SiteError::Navigation("dashboard did not load".into())));
    stack.driver.push("bravo", Ok(bio_change()));

    let handle = stack.controller.run_now().unwrap();
    stack.driver.called.notified().await;
    stack.controller.stop();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("stop should cut the backoff short")
        .unwrap();
    assert!(summary.stopped_early);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failure, 1);

    let records = stack.outcomes.query(&OutcomeQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].account_id, alpha.id);
    assert!(
        records[0]
            .detail
            .starts_with("Maintenance stopped by operator for profile alpha after 1 attempt(s)")
    );

    let bravo = stack.account(bravo.id).await;
    assert_eq!(bravo.status, AccountStatus::Idle);
    assert!(bravo.last_run_at.is_none());

    // The stop-induced failure is reported; the summary is not.
    assert_eq!(
        stack.notifier.subjects(),
        vec!["Profile Automation Failed - alpha".to_string()]
    );
    assert!(!stack.controller.is_running());
}

#[tokio::test]
async fn secret_sealed_with_another_key_fails_without_driving() {
    let stack = Stack::new(fast_settings()).await;
    let other = ChaChaSecretVault::from_base64_key(&ChaChaSecretVault::generate_key()).unwrap();
    let alpha = stack
        .add_account_with_secret("alpha", true, other.seal("pw").unwrap())
        .await;

    let summary = stack.controller.run_batch().await.unwrap();

    assert_eq!(summary.failure, 1);
    assert!(stack.driver.passwords().is_empty());
    let records = stack
        .outcomes
        .query(&OutcomeQuery {
            account_id: Some(alpha.id),
            ..OutcomeQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(
        records[0].detail,
        "Login failed for profile alpha: Stored secret could not be decrypted"
    );
}

#[tokio::test]
async fn recorded_failures_show_in_the_window_summary() {
    let stack = Stack::new(fast_settings()).await;
    stack.add_account("alpha", true).await;
    for _ in 0..3 {
        stack.driver.push("alpha", Err(SiteError::Network("reset".into())));
    }

    stack.controller.run_batch().await.unwrap();

    let summary = stack.controller.outcome_summary(7).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.failure, 1);
    assert!(summary.average_duration_ms.is_some());
    assert_eq!(summary.recent.len(), 1);
    assert_eq!(
        summary.recent[0].detail,
        "Network error for profile alpha: Connection issues detected"
    );
    assert_eq!(stack.notifier.recipients(), vec![OPERATOR, OPERATOR]);
}
