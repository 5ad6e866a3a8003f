//! Operator notification builders
//!
//! The controller sends failure and batch-summary notifications. The
//! success and no-change builders are kept for callers that want them.

use chrono::{DateTime, Utc};

use super::batch::BatchSummary;
use crate::domain::Notification;

const FOOTER: &str = "This is an automated notification from your Profile Automation System.";

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `12.5 seconds` under a minute, `3m 4.0s` above.
pub fn format_duration(total_secs: f64) -> String {
    if total_secs < 60.0 {
        format!("{total_secs:.1} seconds")
    } else {
        let minutes = (total_secs / 60.0).floor();
        let seconds = total_secs - minutes * 60.0;
        format!("{minutes:.0}m {seconds:.1}s")
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn html_page(accent: &str, title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: {accent}; color: white; padding: 20px; text-align: center;">
      <h1>{title}</h1>
    </div>
    <div style="padding: 20px; background-color: #f8f9fa;">
{body}
    </div>
    <div style="text-align: center; padding: 20px; color: #666; font-size: 12px;">
      <p>{FOOTER}</p>
    </div>
  </div>
</body>
</html>"#
    )
}

pub fn failure_notification(
    to: &str,
    login: &str,
    account_id: i64,
    message: &str,
    at: DateTime<Utc>,
) -> Notification {
    let when = timestamp(at);
    let text_body = format!(
        "Profile Automation Failed\n\n\
         Profile: {login}\n\
         Profile ID: {account_id}\n\
         Timestamp: {when}\n\n\
         The automated maintenance for this profile has failed.\n\n\
         Error Details:\n{message}\n\n\
         Please check the profile settings and credentials. The system will retry \
         automatically during the next maintenance cycle.\n\n{FOOTER}\n"
    );
    let html_body = html_page(
        "#dc3545",
        "⚠️ Profile Automation Failed",
        &format!(
            "      <h2>Profile: {login}</h2>\n\
             \x20     <p>The automated maintenance for this profile has failed.</p>\n\
             \x20     <div style=\"background-color: #f8d7da; border: 1px solid #f5c6cb; padding: 15px;\">\
             <strong>Error Details:</strong><br>{message}</div>\n\
             \x20     <p><strong>Profile ID:</strong> {account_id}</p>\n\
             \x20     <p><strong>Timestamp:</strong> {when}</p>\n\
             \x20     <p>Please check the profile settings and credentials. The system will retry \
             automatically during the next maintenance cycle.</p>",
            login = escape_html(login),
            message = escape_html(message),
        ),
    );

    Notification {
        to: to.to_string(),
        subject: format!("Profile Automation Failed - {login}"),
        text_body,
        html_body,
    }
}

pub fn summary_notification(to: &str, summary: &BatchSummary) -> Notification {
    let date = summary.finished_at.format("%Y-%m-%d").to_string();
    let duration = format_duration(summary.elapsed_secs());
    let rate = summary.success_rate() * 100.0;

    let mut remarks = Vec::new();
    if summary.failure > 0 {
        remarks.push(format!(
            "Note: {} profile(s) encountered issues and may need attention.",
            summary.failure
        ));
    }
    if summary.success > 0 {
        remarks.push(format!(
            "Great! {} profile(s) were successfully updated with fresh content.",
            summary.success
        ));
    }
    if summary.no_change > 0 {
        remarks.push(format!(
            "Info: {} profile(s) were already optimal and did not need updates.",
            summary.no_change
        ));
    }

    let text_body = format!(
        "Profile Automation Summary - {date}\n\n\
         Maintenance Summary:\n\
         • Total Profiles: {total}\n\
         • Success: {success}\n\
         • Failed: {failure}\n\
         • No Change: {no_change}\n\
         • Total Duration: {duration}\n\
         • Success Rate: {rate:.1}%\n\n\
         {remarks}\n\n{FOOTER}\n",
        total = summary.total_accounts,
        success = summary.success,
        failure = summary.failure,
        no_change = summary.no_change,
        remarks = remarks.join("\n"),
    );

    let stat = |label: &str, value: usize, color: &str| {
        format!(
            "<div style=\"display: inline-block; padding: 15px 10px; margin: 8px; width: 120px; \
             background-color: white; text-align: center;\">\
             <div style=\"font-size: 24px; font-weight: bold; color: {color};\">{value}</div>\
             <div>{label}</div></div>"
        )
    };
    let html_body = html_page(
        "#007bff",
        &format!("📊 Profile Automation Summary<br><small>{date}</small>"),
        &format!(
            "      <div style=\"text-align: center;\">{}{}{}{}</div>\n\
             \x20     <p><strong>📈 Success Rate:</strong> {rate:.1}%</p>\n\
             \x20     <p><strong>⏱️ Total Duration:</strong> {duration}</p>\n\
             \x20     {}",
            stat("Total Profiles", summary.total_accounts, "#007bff"),
            stat("Success", summary.success, "#28a745"),
            stat("Failed", summary.failure, "#dc3545"),
            stat("No Change", summary.no_change, "#ffc107"),
            remarks
                .iter()
                .map(|r| format!("<p>{}</p>", escape_html(r)))
                .collect::<String>(),
        ),
    );

    Notification {
        to: to.to_string(),
        subject: format!("Profile Automation Summary - {date}"),
        text_body,
        html_body,
    }
}

pub fn success_notification(
    to: &str,
    login: &str,
    account_id: i64,
    updated_fields: &[String],
    duration_ms: u64,
    at: DateTime<Utc>,
) -> Notification {
    let when = timestamp(at);
    let fields = if updated_fields.is_empty() {
        "None".to_string()
    } else {
        updated_fields.join(", ")
    };
    let text_body = format!(
        "Profile Automation Successful\n\n\
         Profile: {login}\nProfile ID: {account_id}\nTimestamp: {when}\n\
         Duration: {duration_ms}ms\n\nUpdated Fields: {fields}\n\n{FOOTER}\n"
    );
    let html_body = html_page(
        "#28a745",
        "✅ Profile Automation Successful",
        &format!(
            "      <h2>Profile: {}</h2>\n\
             \x20     <p><strong>Updated Fields:</strong> {}</p>\n\
             \x20     <p><strong>Profile ID:</strong> {account_id}</p>\n\
             \x20     <p><strong>Duration:</strong> {duration_ms}ms</p>\n\
             \x20     <p><strong>Timestamp:</strong> {when}</p>",
            escape_html(login),
            escape_html(&fields),
        ),
    );

    Notification {
        to: to.to_string(),
        subject: format!("Profile Automation Successful - {login}"),
        text_body,
        html_body,
    }
}

pub fn no_change_notification(
    to: &str,
    login: &str,
    account_id: i64,
    duration_ms: u64,
    at: DateTime<Utc>,
) -> Notification {
    let when = timestamp(at);
    let text_body = format!(
        "Profile Automation Completed - No Changes Needed\n\n\
         Profile: {login}\nProfile ID: {account_id}\nTimestamp: {when}\n\
         Duration: {duration_ms}ms\n\n\
         The profile content is already optimal; no updates were needed.\n\n{FOOTER}\n"
    );
    let html_body = html_page(
        "#ffc107",
        "ℹ️ No Changes Needed",
        &format!(
            "      <h2>Profile: {}</h2>\n\
             \x20     <p>The profile content is already optimal; no updates were needed.</p>\n\
             \x20     <p><strong>Profile ID:</strong> {account_id}</p>\n\
             \x20     <p><strong>Duration:</strong> {duration_ms}ms</p>\n\
             \x20     <p><strong>Timestamp:</strong> {when}</p>",
            escape_html(login),
        ),
    );

    Notification {
        to: to.to_string(),
        subject: format!("Profile Automation Completed - No Changes Needed - {login}"),
        text_body,
        html_body,
    }
}
