//! Alert notifier: destination validation, message composition, SMTP delivery.
//!
//! Delivery goes through the [`MailTransport`] trait. [`SmtpMailer`] is the
//! lettre-backed implementation; tests plug in mocks so no network is used.
//!
//! `Notifier::try_send` never panics and never lets a transport error escape
//! unclassified: every failure comes back as a [`NotificationError`] with one
//! of the distinct [`FailureCategory`](crate::error::FailureCategory) values.

use crate::classifier::ThreatLevel;
use crate::detection::DetectionEvent;
use crate::error::{NotificationError, ValidationError};
use crate::incident_log::CountermeasureOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Documented sender placeholder shipped in sample configs.
pub const PLACEHOLDER_SENDER: &str = "your_email@gmail.com";
/// Documented credential placeholder shipped in sample configs.
pub const PLACEHOLDER_CREDENTIAL: &str = "your_app_password";
/// Documented recipient placeholder shipped in sample configs.
pub const PLACEHOLDER_RECIPIENT: &str = "alert@example.com";
/// Generic placeholder accepted for any destination field.
pub const PLACEHOLDER_GENERIC: &str = "CONFIGURE_IN_ENV";

/// Alert destination and SMTP settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    #[serde(alias = "sender_email")]
    pub sender: String,
    /// SMTP password or app token for `sender`.
    #[serde(alias = "sender_password")]
    pub credential: String,
    #[serde(alias = "recipient_email")]
    pub recipient: String,
    /// Optional text prepended to every subject line.
    #[serde(default)]
    pub subject_prefix: Option<String>,
    pub timeout_secs: u64,
    /// Upgrade with STARTTLS. Disable only for a local relay.
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_starttls() -> bool {
    true
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender: PLACEHOLDER_SENDER.to_string(),
            credential: PLACEHOLDER_CREDENTIAL.to_string(),
            recipient: PLACEHOLDER_RECIPIENT.to_string(),
            subject_prefix: None,
            timeout_secs: 10,
            starttls: true,
        }
    }
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("sender", &self.sender)
            .field("credential", &"[REDACTED]")
            .field("recipient", &self.recipient)
            .field("subject_prefix", &self.subject_prefix)
            .field("timeout_secs", &self.timeout_secs)
            .field("starttls", &self.starttls)
            .finish()
    }
}

impl NotifierConfig {
    /// Check sender, credential and recipient against the placeholder sentinels.
    pub fn validate_destination(&self) -> Result<(), ValidationError> {
        check_field("sender", &self.sender, PLACEHOLDER_SENDER)?;
        check_field("credential", &self.credential, PLACEHOLDER_CREDENTIAL)?;
        check_field("recipient", &self.recipient, PLACEHOLDER_RECIPIENT)?;
        Ok(())
    }

    /// Copy safe to print: the credential is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.credential.is_empty() {
            copy.credential = "********".to_string();
        }
        copy
    }
}

fn check_field(
    field: &'static str,
    value: &str,
    placeholder: &str,
) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingDestination { field });
    }
    if value == placeholder || value == PLACEHOLDER_GENERIC {
        return Err(ValidationError::PlaceholderDestination { field });
    }
    Ok(())
}

/// Delivery counters exposed on the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    pub total_sent: u64,
    pub recipient: String,
}

/// A fully composed alert ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

/// Facts embedded into an alert.
#[derive(Debug, Clone, Copy)]
pub struct AlertContext<'a> {
    pub event: &'a DetectionEvent,
    pub level: ThreatLevel,
    pub countermeasure: CountermeasureOutcome,
}

/// Transport seam for alert delivery.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &AlertMessage) -> Result<(), NotificationError>;
}

/// Alert notifier with fail-fast destination validation.
pub struct Notifier {
    config: NotifierConfig,
    transport: Box<dyn MailTransport>,
    total_sent: AtomicU64,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.config)
            .field("total_sent", &self.total_sent.load(Ordering::Relaxed))
            .finish()
    }
}

impl Notifier {
    pub fn new(config: NotifierConfig, transport: Box<dyn MailTransport>) -> Self {
        Self {
            config,
            transport,
            total_sent: AtomicU64::new(0),
        }
    }

    /// Notifier delivering over SMTP, STARTTLS unless disabled in `config`.
    pub fn smtp(config: NotifierConfig) -> Self {
        let transport = SmtpMailer::new(&config);
        Self::new(config, Box::new(transport))
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Compose the dual-format alert for a detection.
    pub fn compose(&self, ctx: &AlertContext<'_>) -> AlertMessage {
        let event = ctx.event;
        let subject = match &self.config.subject_prefix {
            Some(prefix) if !prefix.trim().is_empty() => format!(
                "{} [{}] Unauthorized {} detected",
                prefix.trim(),
                ctx.level,
                event.class_name()
            ),
            _ => format!("[{}] Unauthorized {} detected", ctx.level, event.class_name()),
        };
        let confidence = format!("{:.2}%", event.confidence() * 100.0);
        let detected_at = event.timestamp().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let countermeasure = match ctx.countermeasure {
            CountermeasureOutcome::Activated => "countermeasure cycle completed (simulated)",
            CountermeasureOutcome::Failed => "countermeasure activation FAILED",
            CountermeasureOutcome::Skipped => "countermeasure not required",
        };

        let plain_body = format!(
            "UNAUTHORIZED {class} DETECTED\n\
             ==============================\n\
             \n\
             Threat level: {level}\n\
             Detected at:  {detected_at}\n\
             \n\
             Detection details:\n\
             - Class:      {class_name}\n\
             - Confidence: {confidence}\n\
             - Location:   {bbox}\n\
             \n\
             Response:\n\
             - {countermeasure}\n\
             - alert notification sent\n\
             - incident recorded in the audit log\n\
             \n\
             --\n\
             Automated alert from the Skyguard response service.\n",
            class = event.class_name().to_uppercase(),
            level = ctx.level,
            class_name = event.class_name(),
            bbox = event.bbox(),
        );

        let html_body = format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif; color: #333;">
    <div style="border: 3px solid #d32f2f; padding: 20px; border-radius: 8px; background-color: #ffebee;">
      <h2 style="color: #d32f2f; text-align: center;">Unauthorized {class} detected</h2>
      <p><strong>Threat level:</strong> {level}</p>
      <p><strong>Detected at:</strong> {detected_at}</p>
      <table style="width: 100%; border-collapse: collapse;">
        <tr><td style="padding: 8px; font-weight: bold;">Class</td><td style="padding: 8px;">{class}</td></tr>
        <tr><td style="padding: 8px; font-weight: bold;">Confidence</td><td style="padding: 8px;">{confidence}</td></tr>
        <tr><td style="padding: 8px; font-weight: bold;">Location (bbox)</td><td style="padding: 8px;">{bbox}</td></tr>
      </table>
      <h3>Response</h3>
      <ul>
        <li>{countermeasure}</li>
        <li>alert notification sent</li>
        <li>incident recorded in the audit log</li>
      </ul>
      <p style="color: #666; font-size: 12px;">Automated alert from the Skyguard response service.</p>
    </div>
  </body>
</html>
"#,
            class = escape_html(event.class_name()),
            level = ctx.level,
            bbox = event.bbox(),
        );

        AlertMessage {
            from: self.config.sender.trim().to_string(),
            to: self.config.recipient.trim().to_string(),
            subject,
            plain_body,
            html_body,
        }
    }

    /// Validate, compose and deliver one alert.
    ///
    /// Returns the new delivery total on success. Destination problems fail
    /// before the transport is touched.
    pub async fn try_send(&self, ctx: &AlertContext<'_>) -> Result<u64, NotificationError> {
        if let Err(e) = self.config.validate_destination() {
            warn!(error = %e, "Alert destination not configured, skipping delivery");
            return Err(e.into());
        }

        let message = self.compose(ctx);
        info!(
            recipient = %message.to,
            level = %ctx.level,
            "Dispatching threat alert"
        );

        match self.transport.deliver(&message).await {
            Ok(()) => {
                let total = self.total_sent.fetch_add(1, Ordering::SeqCst) + 1;
                info!(total_sent = total, "Threat alert delivered");
                Ok(total)
            }
            Err(e) => {
                error!(category = %e.category(), error = %e, "Threat alert delivery failed");
                Err(e)
            }
        }
    }

    /// Boolean form of [`Notifier::try_send`].
    pub async fn send(&self, ctx: &AlertContext<'_>) -> bool {
        self.try_send(ctx).await.is_ok()
    }

    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            total_sent: self.total_sent.load(Ordering::SeqCst),
            recipient: self.config.recipient.clone(),
        }
    }
}

/// Minimal HTML escaping for untrusted text.
pub fn escape_html(input: &str) -> String {
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

/// SMTP transport using lettre, over STARTTLS by default.
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
    starttls: bool,
}

impl SmtpMailer {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            username: config.sender.trim().to_string(),
            password: config.credential.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            starttls: config.starttls,
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: &AlertMessage) -> Result<(), NotificationError> {
        use lettre::AsyncTransport;
        use lettre::message::MultiPart;

        let email = lettre::Message::builder()
            .from(message.from.parse().map_err(|e| NotificationError::Unexpected {
                message: format!("Invalid from address: {e}"),
            })?)
            .to(message.to.parse().map_err(|e| NotificationError::Unexpected {
                message: format!("Invalid to address: {e}"),
            })?)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.plain_body.clone(),
                message.html_body.clone(),
            ))
            .map_err(|e| NotificationError::Unexpected {
                message: format!("Failed to build email: {e}"),
            })?;

        let creds = lettre::transport::smtp::authentication::Credentials::new(
            self.username.clone(),
            self.password.clone(),
        );

        type Smtp = lettre::AsyncSmtpTransport<lettre::Tokio1Executor>;
        let builder = if self.starttls {
            Smtp::starttls_relay(&self.host).map_err(classify_smtp_error)?
        } else {
            Smtp::builder_dangerous(self.host.as_str())
        };
        let mailer = builder
            .port(self.port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build();

        mailer.send(email).await.map_err(classify_smtp_error)?;
        Ok(())
    }
}

/// Sort a lettre SMTP error into authentication, protocol or unexpected.
fn classify_smtp_error(e: lettre::transport::smtp::Error) -> NotificationError {
    let code = e.status().map(|c| c.to_string());
    match code.as_deref() {
        Some("530" | "534" | "535") => NotificationError::Authentication {
            message: e.to_string(),
        },
        _ if e.is_permanent() || e.is_transient() || e.is_response() || e.is_client() => {
            NotificationError::Protocol {
                message: e.to_string(),
            }
        }
        _ => NotificationError::Unexpected {
            message: e.to_string(),
        },
    }
}
