//! Domain module - entities, failure taxonomy and capability traits
//!
//! Nothing in here knows about SQLite, HTTP or axum. The application layer
//! talks to the outside world only through the traits re-exported below.

pub mod account;
pub mod outcome;
pub mod site_error;
pub mod repositories;
pub mod capabilities;

pub use account::{Account, AccountStatus, Credentials, NewAccount, RunRecord};
pub use outcome::{
    AccountOutcomeCounts, ChangedFields, DailyOutcomeCounts, FieldChange, NewOutcome,
    OutcomeCounts, OutcomeKind, OutcomeQuery, OutcomeRecord, OutcomeStats, OutcomeSummary,
};
pub use site_error::{FailureClass, LoginFailure, SiteError};
pub use repositories::{AccountRepository, OutcomeRepository};
pub use capabilities::{Notification, Notifier, SecretVault, SiteDriver};
