//! Email delivery via SMTP.
//!
//! Wraps the `lettre` async SMTP transport. Configuration is loaded from
//! environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and no email sender should be
//! registered.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use portaria_core::channel::Channel;

use crate::sender::{ChannelSender, SendOutcome, SendRequest};

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when neither the tenant nor `SMTP_FROM` set one.
const DEFAULT_FROM_ADDRESS: &str = "noreply@portaria.local";

/// Configuration for the SMTP email sender.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// Fallback RFC 5322 "From" address when the tenant has none.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and should be skipped.
    ///
    /// | Variable        | Required | Default                  |
    /// |-----------------|----------|--------------------------|
    /// | `SMTP_HOST`     | yes      | —                        |
    /// | `SMTP_PORT`     | no       | `587`                    |
    /// | `SMTP_FROM`     | no       | `noreply@portaria.local` |
    /// | `SMTP_USER`     | no       | —                        |
    /// | `SMTP_PASSWORD` | no       | —                        |
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

/// Sends notification emails via SMTP.
pub struct EmailSender {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    /// Build the sender and its pooled transport.
    pub fn new(config: EmailConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = builder.build();
        Ok(Self { config, transport })
    }

    /// Tenant sender address, falling back to the deployment default.
    fn from_header(&self, request: &SendRequest) -> String {
        let address = request
            .email_remetente
            .clone()
            .unwrap_or_else(|| self.config.from_address.clone());
        match &request.email_nome_remetente {
            Some(name) => format!("{name} <{address}>"),
            None => address,
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, request: &SendRequest) -> SendOutcome {
        let from = match self.from_header(request).parse::<lettre::message::Mailbox>() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                return SendOutcome::Rejected {
                    code: "invalid_sender".to_string(),
                    message: e.to_string(),
                }
            }
        };
        let to = match format!(
            "{} <{}>",
            request.destinatario_nome, request.destinatario_email
        )
        .parse::<lettre::message::Mailbox>()
        {
            Ok(mailbox) => mailbox,
            Err(e) => {
                return SendOutcome::Rejected {
                    code: "invalid_recipient".to_string(),
                    message: e.to_string(),
                }
            }
        };

        let message = match Message::builder()
            .from(from)
            .to(to)
            .subject(&request.titulo)
            .header(ContentType::TEXT_PLAIN)
            .body(request.corpo.clone())
        {
            Ok(message) => message,
            Err(e) => {
                return SendOutcome::Rejected {
                    code: "build_failed".to_string(),
                    message: e.to_string(),
                }
            }
        };

        match self.transport.send(message).await {
            Ok(response) => {
                tracing::info!(
                    to = %request.destinatario_email,
                    entrega_id = request.entrega_id,
                    "Notification email accepted by SMTP relay"
                );
                SendOutcome::Accepted {
                    provider_id: response.message().next().map(|m| m.to_string()),
                    response: None,
                    custo_centavos: None,
                    units: 1,
                }
            }
            // Relay-level errors are retried; the relay may be restarting.
            Err(e) => SendOutcome::TransientError {
                code: "smtp_error".to_string(),
                message: e.to_string(),
            },
        }
    }
}
