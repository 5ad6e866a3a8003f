//! HTTP client for the browser-automation sidecar
//!
//! The sidecar owns the browser. One `POST {endpoint}/v1/profile-refresh`
//! performs the whole profile edit for one account and answers with the
//! fields it changed, or with a typed error body.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{ChangedFields, Credentials, LoginFailure, SiteDriver, SiteError};

const REFRESH_PATH: &str = "v1/profile-refresh";

#[derive(Serialize)]
struct RefreshRequest<'a> {
    login: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    changed_fields: ChangedFields,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    login_reason: Option<String>,
}

impl ErrorBody {
    fn into_site_error(self) -> SiteError {
        let message = self.message;
        match self.kind.as_str() {
            "login" => SiteError::Login(login_failure(self.login_reason.as_deref(), message)),
            "navigation" => SiteError::Navigation(message),
            "timeout" => SiteError::Timeout(message),
            "element_not_found" => SiteError::ElementNotFound(message),
            "content_generation" => SiteError::ContentGeneration(message),
            "profile_update" => SiteError::ProfileUpdate(message),
            "network" => SiteError::Network(message),
            _ => SiteError::Unclassified(message),
        }
    }
}

fn login_failure(reason: Option<&str>, message: String) -> LoginFailure {
    match reason {
        Some("invalid_credentials") => LoginFailure::InvalidCredentials,
        Some("still_on_login_page") => LoginFailure::StillOnLoginPage,
        Some("account_locked") => LoginFailure::AccountLocked,
        Some("too_many_attempts") => LoginFailure::TooManyAttempts,
        Some("captcha_required") => LoginFailure::CaptchaRequired,
        _ => LoginFailure::Other(message),
    }
}

/// Map a non-success response onto the site failure taxonomy.
fn error_from_response(status: StatusCode, body: &str) -> SiteError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.into_site_error(),
        Err(_) => SiteError::Unclassified(format!(
            "site driver returned {status}: {}",
            body.chars().take(200).collect::<String>()
        )),
    }
}

fn error_from_transport(err: &reqwest::Error) -> SiteError {
    if err.is_timeout() {
        SiteError::Timeout(format!("site driver request timed out: {err}"))
    } else if err.is_connect() {
        SiteError::Network(format!("could not reach site driver: {err}"))
    } else if err.is_decode() {
        SiteError::Unclassified(format!("unreadable site driver response: {err}"))
    } else {
        SiteError::Network(err.to_string())
    }
}

pub struct HttpSiteDriver {
    client: Client,
    refresh_url: Url,
}

impl HttpSiteDriver {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(endpoint)
            .with_context(|| format!("Invalid site driver endpoint: {endpoint}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let refresh_url = base
            .join(REFRESH_PATH)
            .context("Failed to build site driver refresh url")?;

        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("profile-maintainer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, refresh_url })
    }

    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    async fn send(&self, credentials: &Credentials) -> Result<ChangedFields, SiteError> {
        let response = self
            .client
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                login: &credentials.login,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| error_from_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| error_from_transport(&e))?;
        debug!("Site driver answered {} for {}", status, credentials.login);

        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }
        serde_json::from_str::<RefreshResponse>(&body)
            .map(|r| r.changed_fields)
            .map_err(|e| SiteError::Unclassified(format!("unreadable site driver response: {e}")))
    }
}

#[async_trait]
impl SiteDriver for HttpSiteDriver {
    async fn refresh_profile(
        &self,
        credentials: &Credentials,
        stop: &CancellationToken,
    ) -> Result<ChangedFields, SiteError> {
        // A started request always runs to completion; the sidecar may
        // already be saving the profile.
        if stop.is_cancelled() {
            warn!("🛑 Stop requested, not starting a refresh for {}", credentials.login);
            return Err(SiteError::Unclassified("cancelled".into()));
        }
        self.send(credentials).await
    }
}
