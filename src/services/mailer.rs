use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MailConfig;
use crate::error::{AppError, Result};

/// Outgoing email
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Email delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sends mail through an HTTP email API
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct SendPayload<'a> {
    from: &'a str,
    #[serde(flatten)]
    message: &'a EmailMessage,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&SendPayload {
            from: &self.from,
            message,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| AppError::Mail(format!("Email API request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AppError::Mail(format!(
                "Email API responded with status {}",
                resp.status()
            )));
        }

        tracing::info!("Sent email to {}", message.to);
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            "Email delivery not configured; would send {:?} to {}: {}",
            message.subject,
            message.to,
            message.text
        );
        Ok(())
    }
}

/// Build the configured mailer
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.endpoint.trim().is_empty() {
        tracing::warn!("No mail endpoint configured, emails will only be logged");
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(HttpMailer::new(config)?))
}

/// Message sent to the recipient named at upload time
pub fn upload_notification(to: &str, download_link: &str, retention_hours: i64) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "File download link".to_string(),
        text: format!(
            "You have received a file. Download: {}\nIt will expire in {} hours.",
            download_link, retention_hours
        ),
        html: None,
    }
}

/// Message for an explicit "send link by email" request
pub fn share_link_notification(
    to: &str,
    download_link: &str,
    file_name: Option<&str>,
    expiry_time: Option<&str>,
) -> EmailMessage {
    let file_name = file_name.unwrap_or("(unnamed file)");
    let expiry = expiry_time.map(describe_expiry);

    let mut text = format!(
        "You have received a file\nFile name: {}\nDownload link: {}\n",
        file_name, download_link
    );
    let mut html = format!(
        "<h2>You have received a file</h2>\n<p>File name: {}</p>\n<p>Download link: <a href=\"{}\">{}</a></p>\n",
        escape_html(file_name),
        escape_html(download_link),
        escape_html(download_link)
    );
    if let Some(expiry) = expiry {
        text.push_str(&format!("This link will expire on {}\n", expiry));
        html.push_str(&format!("<p>This link will expire on {}</p>\n", escape_html(&expiry)));
    }

    EmailMessage {
        to: to.to_string(),
        subject: "File download link".to_string(),
        text,
        html: Some(html),
    }
}

fn describe_expiry(raw: &str) -> String {
    match crate::models::parse_timestamp(raw) {
        Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => raw.to_string(),
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
