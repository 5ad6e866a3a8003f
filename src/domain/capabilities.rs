//! External capabilities the run controller drives
//!
//! - `SiteDriver`: performs the profile edit for one account
//! - `Notifier`: delivers operator messages
//! - `SecretVault`: seals and opens stored account secrets

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::account::Credentials;
use super::outcome::ChangedFields;
use super::site_error::SiteError;

/// Browser-automation capability for one account.
///
/// An empty map means the driver ran but found nothing to change. The driver
/// bounds its own steps; the token lets it give up early when a stop is
/// requested, but it is not required to honour it.
#[async_trait]
pub trait SiteDriver: Send + Sync {
    async fn refresh_profile(
        &self,
        credentials: &Credentials,
        stop: &CancellationToken,
    ) -> Result<ChangedFields, SiteError>;
}

/// A composed operator message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

pub trait SecretVault: Send + Sync {
    fn seal(&self, plaintext: &str) -> Result<String>;

    fn open(&self, sealed: &str) -> Result<String>;
}
