//! Outgoing mail.
//!
//! [`EmailSender`] is the seam the rest of the crate talks to. SMTP delivery
//! goes through lettre's async transport; when mail is disabled messages are
//! only logged.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::MailConfig;
use crate::db::AppointmentRequest;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        };

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            // App passwords are often pasted with spaces.
            let password: String = password.chars().filter(|c| !c.is_whitespace()).collect();
            builder = builder.credentials(Credentials::new(username.trim().to_string(), password));
        }

        let from = config
            .from_address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid mail.from_address: {e}"))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?;

        let plain = html2text::from_read(email.html_body.as_bytes(), 80)
            .unwrap_or_else(|_| email.html_body.clone());

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                plain,
                email.html_body.clone(),
            ))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Used when SMTP is not configured. Nothing leaves the process.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        tracing::warn!(
            to = %email.to,
            subject = %email.subject,
            "Mail delivery disabled, email not sent"
        );
        Ok(())
    }
}

/// Keeps every message in memory. Handy for tests and local runs.
#[derive(Default)]
pub struct MemoryEmailSender {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl MemoryEmailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EmailSender for MemoryEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}

/// Sends with an upper bound on the whole exchange.
pub async fn send_with_timeout(
    sender: &dyn EmailSender,
    email: &OutgoingEmail,
    limit: Duration,
) -> Result<(), EmailError> {
    match tokio::time::timeout(limit, sender.send(email)).await {
        Ok(result) => result,
        Err(_) => Err(EmailError::Timeout(limit)),
    }
}

fn escape(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}

fn wrap(heading: &str, body: &str, clinic_name: &str) -> String {
    format!(
        "<html><body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\
         <div style=\"max-width: 600px; margin: 0 auto; padding: 20px;\">\
         <h1>{heading}</h1>{body}\
         <hr><p style=\"font-size: 12px; color: #666;\">This is an automated message from {clinic}.<br>\
         Please do not reply to this email.</p></div></body></html>",
        clinic = escape(clinic_name),
    )
}

#[must_use]
pub fn password_reset_email(
    to: &str,
    clinic_name: &str,
    reset_url: &str,
    ttl_minutes: i64,
) -> OutgoingEmail {
    let url = html_escape::encode_double_quoted_attribute(reset_url);
    let body = format!(
        "<p>We received a request to reset your admin password for <strong>{clinic}</strong>.</p>\
         <p><a href=\"{url}\">Reset Password</a></p>\
         <p>Or copy and paste this link into your browser:</p><p>{text_url}</p>\
         <p><strong>This link will expire in {ttl_minutes} minutes.</strong></p>\
         <p>If you didn't request this password reset, please ignore this email.</p>",
        clinic = escape(clinic_name),
        text_url = escape(reset_url),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("{clinic_name} - Password Reset Request"),
        html_body: wrap("Password Reset Request", &body, clinic_name),
    }
}

#[must_use]
pub fn password_changed_email(to: &str, clinic_name: &str) -> OutgoingEmail {
    let body = format!(
        "<p>Your admin password for <strong>{clinic}</strong> has been successfully changed.</p>\
         <p>If you made this change, no further action is needed.</p>\
         <p><strong>If you did not make this change, contact your system administrator immediately.</strong></p>",
        clinic = escape(clinic_name),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("{clinic_name} - Password Changed Successfully"),
        html_body: wrap("Password Changed", &body, clinic_name),
    }
}

#[must_use]
pub fn appointment_notification_email(
    to: &str,
    clinic_name: &str,
    request: &AppointmentRequest,
) -> OutgoingEmail {
    let note = request.note.as_deref().unwrap_or("-");
    let body = format!(
        "<p>A new appointment request was submitted.</p><ul>\
         <li><strong>Name:</strong> {name}</li>\
         <li><strong>Contact:</strong> {contact}</li>\
         <li><strong>Preferred times:</strong> {times}</li>\
         <li><strong>Service:</strong> {service}</li>\
         <li><strong>Note:</strong> {note}</li></ul>",
        name = escape(&request.name),
        contact = escape(&request.contact),
        times = escape(&request.preferred_times),
        service = escape(&request.service),
        note = escape(note),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("{clinic_name} - New Appointment Request"),
        html_body: wrap("New Appointment Request", &body, clinic_name),
    }
}
