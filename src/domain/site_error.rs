//! Failures a site driver can report for one account
//!
//! The driver returns a closed set of variants; classification is a match.
//! Only `SiteError::Unclassified` (free text from a driver that could not
//! say what went wrong) falls back to keyword matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a login attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum LoginFailure {
    InvalidCredentials,
    StillOnLoginPage,
    AccountLocked,
    TooManyAttempts,
    CaptchaRequired,
    Other(String),
}

impl LoginFailure {
    /// Operator-facing explanation of the login rejection.
    pub fn explanation(&self) -> &str {
        match self {
            Self::InvalidCredentials => "Invalid username or password",
            Self::StillOnLoginPage => "Could not access account (check credentials)",
            Self::AccountLocked => "Account is locked or suspended",
            Self::TooManyAttempts => "Too many failed login attempts",
            Self::CaptchaRequired => "CAPTCHA verification required",
            Self::Other(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    #[error("login failed: {}", .0.explanation())]
    Login(LoginFailure),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("required element not found: {0}")]
    ElementNotFound(String),

    #[error("content generation failed: {0}")]
    ContentGeneration(String),

    #[error("profile update failed: {0}")]
    ProfileUpdate(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Unclassified(String),
}

/// Failure classes used for message text and backoff length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureClass {
    Login,
    Navigation,
    ElementNotFound,
    ContentGeneration,
    ProfileUpdate,
    Network,
    Unknown,
}

impl FailureClass {
    /// Classes whose retries wait on the long backoff unit.
    pub const fn uses_long_backoff(self) -> bool {
        matches!(self, Self::Navigation | Self::Network)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Navigation => "navigation",
            Self::ElementNotFound => "element_not_found",
            Self::ContentGeneration => "content_generation",
            Self::ProfileUpdate => "profile_update",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    /// Best-effort guess from free text.
    fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["login", "credential", "password"]) {
            Self::Login
        } else if has(&["timeout", "timed out", "navigation"]) {
            Self::Navigation
        } else if has(&["element", "selector", "not found"]) {
            Self::ElementNotFound
        } else if has(&["content generation", "generation", "openai"]) {
            Self::ContentGeneration
        } else if has(&["save", "update"]) {
            Self::ProfileUpdate
        } else if has(&["network", "connection", "dns"]) {
            Self::Network
        } else {
            Self::Unknown
        }
    }
}

impl SiteError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Login(_) => FailureClass::Login,
            Self::Navigation(_) | Self::Timeout(_) => FailureClass::Navigation,
            Self::ElementNotFound(_) => FailureClass::ElementNotFound,
            Self::ContentGeneration(_) => FailureClass::ContentGeneration,
            Self::ProfileUpdate(_) => FailureClass::ProfileUpdate,
            Self::Network(_) => FailureClass::Network,
            Self::Unclassified(message) => FailureClass::from_message(message),
        }
    }

    /// Message stored on the outcome record and used in the failure email.
    pub fn operator_message(&self, login: &str) -> String {
        match (self.class(), self) {
            (_, Self::Login(reason)) => {
                format!("Login failed for profile {login}: {}", reason.explanation())
            }
            (FailureClass::Login, _) => {
                format!("Login failed for profile {login}: {}", self.detail())
            }
            (FailureClass::Navigation, _) => {
                format!("Navigation error for profile {login}: Could not load required pages")
            }
            (FailureClass::ElementNotFound, _) => format!(
                "Website structure changed for profile {login}: Required elements not found"
            ),
            (FailureClass::ContentGeneration, _) => format!(
                "AI content generation failed for profile {login}: {}",
                self.detail()
            ),
            (FailureClass::ProfileUpdate, _) => {
                format!("Profile update failed for profile {login}: Could not save changes")
            }
            (FailureClass::Network, _) => {
                format!("Network error for profile {login}: Connection issues detected")
            }
            (FailureClass::Unknown, _) => {
                format!("Unexpected error for profile {login}: {}", self.detail())
            }
        }
    }

    /// Inner text without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Login(reason) => reason.explanation(),
            Self::Navigation(m)
            | Self::Timeout(m)
            | Self::ElementNotFound(m)
            | Self::ContentGeneration(m)
            | Self::ProfileUpdate(m)
            | Self::Network(m)
            | Self::Unclassified(m) => m,
        }
    }
}
