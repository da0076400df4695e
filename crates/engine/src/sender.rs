//! Channel provider abstraction.
//!
//! Each outbound channel is served by one [`ChannelSender`]. The dispatcher
//! never talks to a provider directly; it builds a [`SendRequest`], looks
//! the sender up in the [`SenderRegistry`], and classifies the
//! [`SendOutcome`] into the delivery state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use portaria_core::channel::Channel;
use portaria_core::status::{NotificationType, Priority};
use portaria_core::types::DbId;

/// Default provider call timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a provider needs to deliver one attempt.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub entrega_id: DbId,
    pub notificacao_id: DbId,
    pub condominio_id: DbId,
    pub tipo: NotificationType,
    pub prioridade: Priority,
    pub titulo: String,
    pub corpo: String,
    pub destinatario_nome: String,
    pub destinatario_email: String,
    pub whatsapp_numero: Option<String>,
    pub sms_numero: Option<String>,
    pub voz_numero: Option<String>,
    pub push_tokens: Option<serde_json::Value>,
    pub email_remetente: Option<String>,
    pub email_nome_remetente: Option<String>,
}

/// How a provider call ended, as seen by the delivery state machine.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The provider accepted the message.
    Accepted {
        provider_id: Option<String>,
        response: Option<serde_json::Value>,
        /// Channel cost, when the provider reports one (metered channels).
        custo_centavos: Option<i32>,
        /// Quota units consumed: 1 for messages, minutes for voice calls.
        units: i32,
    },
    /// Permanent refusal (bad address, opted-out number). No retry.
    Rejected { code: String, message: String },
    /// Transient failure (timeout, 5xx, connection refused). Retried with
    /// backoff while attempts remain.
    TransientError { code: String, message: String },
}

impl SendOutcome {
    /// An acceptance consuming one quota unit.
    pub fn accepted(provider_id: Option<String>) -> Self {
        SendOutcome::Accepted {
            provider_id,
            response: None,
            custo_centavos: None,
            units: 1,
        }
    }
}

/// One outbound channel provider.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender serves.
    fn channel(&self) -> Channel;

    /// Perform one delivery attempt. Implementations classify their own
    /// errors; this method itself never fails.
    async fn send(&self, request: &SendRequest) -> SendOutcome;
}

/// Registry mapping channels to their configured senders.
///
/// Channels without a registered sender are unconfigured for this
/// deployment; the dispatcher fails their deliveries terminally.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    timeout: Option<Duration>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-call timeout (defaults to [`DEFAULT_SEND_TIMEOUT`]).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register a sender under its own channel.
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&channel)
    }

    /// Invoke a channel's sender with the registry timeout applied.
    ///
    /// A timed-out call counts as a transient error: the provider may or
    /// may not have accepted the message, so the retry path (and the
    /// provider's own dedup) must absorb it.
    pub async fn send_with_timeout(
        &self,
        channel: Channel,
        request: &SendRequest,
    ) -> Option<SendOutcome> {
        let sender = self.get(channel)?;
        let timeout = self.timeout.unwrap_or(DEFAULT_SEND_TIMEOUT);
        let outcome = match tokio::time::timeout(timeout, sender.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::TransientError {
                code: "timeout".to_string(),
                message: format!("provider call exceeded {}s", timeout.as_secs()),
            },
        };
        Some(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
