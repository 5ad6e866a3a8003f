//! Account entity and its status label
//!
//! An account is one externally hosted profile: a login handle, a sealed
//! secret and the scheduling metadata the maintenance run keeps current.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};

/// Free-text status label stored on each account.
///
/// The run controller only ever writes the known variants; anything else an
/// operator put into the store round-trips through `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AccountStatus {
    #[default]
    Idle,
    Running,
    Completed,
    NoChange,
    Error,
    Other(String),
}

impl AccountStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::NoChange => "NoChange",
            Self::Error => "Error",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AccountStatus {
    fn from(label: &str) -> Self {
        match label {
            "Idle" => Self::Idle,
            "Running" => Self::Running,
            "Completed" => Self::Completed,
            "NoChange" => Self::NoChange,
            "Error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for AccountStatus {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<AccountStatus> for String {
    fn from(status: AccountStatus) -> Self {
        status.as_str().to_string()
    }
}

impl FromStr for AccountStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Type<sqlx::Sqlite> for AccountStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for AccountStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<'q, sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for AccountStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let label = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self::from(label))
    }
}

/// A stored account as the run controller sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub login: String,
    #[serde(skip_serializing)]
    pub encrypted_secret: String,
    pub is_active: bool,
    pub status: AccountStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub login: String,
    pub encrypted_secret: String,
    pub is_active: bool,
    pub notes: Option<String>,
}

/// Timestamps written back after an account has been processed.
///
/// `None` for `success_at` / `next_run_at` leaves the stored value as it was.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub status: AccountStatus,
    pub ran_at: DateTime<Utc>,
    pub success_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Plaintext credentials handed to the site driver for one account.
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_round_trip() {
        for label in ["Idle", "Running", "Completed", "NoChange", "Error"] {
            let status = AccountStatus::from(label);
            assert!(!matches!(status, AccountStatus::Other(_)));
            assert_eq!(status.as_str(), label);
        }
    }

    #[test]
    fn unknown_label_is_preserved() {
        let status: AccountStatus = "Paused by operator".parse().unwrap();
        assert_eq!(status, AccountStatus::Other("Paused by operator".into()));
        assert_eq!(status.to_string(), "Paused by operator");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            login: "dr.alvarez".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("dr.alvarez"));
        assert!(!printed.contains("hunter2"));
    }
}
