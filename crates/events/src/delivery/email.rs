//! Team notification email via SMTP.
//!
//! If `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and
//! teams are not emailed.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::bus::PlatformEvent;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

const DEFAULT_SMTP_PORT: u16 = 587;

const DEFAULT_FROM_ADDRESS: &str = "numguard@localhost";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load from the environment.
    ///
    /// | Variable        | Required | Default              |
    /// |-----------------|----------|----------------------|
    /// | `SMTP_HOST`     | yes      | (email disabled)     |
    /// | `SMTP_PORT`     | no       | `587`                |
    /// | `SMTP_FROM`     | no       | `numguard@localhost` |
    /// | `SMTP_USER`     | no       |                      |
    /// | `SMTP_PASSWORD` | no       |                      |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Email `to_email` about `event`.
    pub async fn deliver(&self, to_email: &str, event: &PlatformEvent) -> Result<(), EmailError> {
        let (subject, body) = render(event);

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);
        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport.build().send(email).await?;

        tracing::info!(to = to_email, event_type = %event.event_type, "Team notification sent");
        Ok(())
    }
}

/// Subject and plain-text body for a team notification.
fn render(event: &PlatformEvent) -> (String, String) {
    let subject = match event.payload.get("number").and_then(|n| n.as_str()) {
        Some(number) => format!("[numguard] {} {number}", event.event_type),
        None => format!("[numguard] {}", event.event_type),
    };
    let body = format!(
        "Event: {}\nTime: {}\nDetails: {}",
        event.event_type,
        event.timestamp.to_rfc3339(),
        serde_json::to_string_pretty(&event.payload).unwrap_or_default()
    );
    (subject, body)
}
