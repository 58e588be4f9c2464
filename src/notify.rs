use std::fmt::Write;

use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::models::DailyReport;

pub fn subject(report: &DailyReport) -> String {
    format!(
        "Daily activity report for {}",
        report.report_date.format("%Y-%m-%d")
    )
}

pub fn render_body(report: &DailyReport, mirror_link: &str) -> String {
    let mut body = String::new();

    let _ = writeln!(body, "Hello!");
    let _ = writeln!(body);
    if report.has_data() {
        let _ = writeln!(body, "Here is today's activity summary:");
    } else {
        let _ = writeln!(body, "No attempts were recorded today.");
    }
    let _ = writeln!(body);
    for (label, value) in report.metrics() {
        let _ = writeln!(body, "- {label}: {value}");
    }
    let _ = writeln!(body);
    let _ = writeln!(body, "Raw data and the detailed report are available at:");
    let _ = writeln!(body, "{mirror_link}");
    let _ = writeln!(body);
    let _ = writeln!(body, "The job finished successfully.");

    body
}

/// Email the report. Returns `Ok(false)` when email settings are incomplete.
pub async fn send_report(
    config: &EmailConfig,
    report: &DailyReport,
    mirror_link: &str,
) -> anyhow::Result<bool> {
    let Some(creds) = config.credentials() else {
        warn!("email settings incomplete, notification skipped");
        return Ok(false);
    };

    let from: Mailbox = creds.sender.parse().context("invalid EMAIL_SENDER")?;
    let to: Mailbox = creds.receiver.parse().context("invalid EMAIL_RECEIVER")?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject(report))
        .header(ContentType::TEXT_PLAIN)
        .body(render_body(report, mirror_link))
        .context("failed to build email")?;

    let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
        .context("invalid SMTP server")?
        .port(config.smtp_port)
        .credentials(Credentials::new(
            creds.sender.to_string(),
            creds.password.to_string(),
        ))
        .build();

    mailer
        .send(message)
        .await
        .context("failed to send email")?;
    info!(receiver = creds.receiver, "report email sent");
    Ok(true)
}
