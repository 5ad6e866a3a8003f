//! Operator notification delivery
//!
//! `LogNotifier` only writes the message to the log. `WebhookNotifier` posts
//! it as JSON to a mail relay or chat hook.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::domain::{Notification, Notifier};

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!("📧 Notification to {}: {}", notification.to, notification.subject);
        debug!("{}", notification.text_body);
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
    sender_name: &'a str,
}

pub struct WebhookNotifier {
    client: Client,
    url: Url,
    sender_name: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, sender_name: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid webhook url: {url}"))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url,
            sender_name: sender_name.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload {
                to: &notification.to,
                subject: &notification.subject,
                text: &notification.text_body,
                html: &notification.html_body,
                sender_name: &self.sender_name,
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach notification webhook {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Notification webhook answered {}", status);
        }
        info!("📧 Notification sent to {}: {}", notification.to, notification.subject);
        Ok(())
    }
}
