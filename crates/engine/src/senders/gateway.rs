//! HTTP gateway senders for push, WhatsApp, SMS, and voice.
//!
//! Each provider is reached through a JSON POST to a configured endpoint.
//! Response classification: 2xx is accepted, 4xx is a permanent rejection,
//! everything else (5xx, connection errors) is transient and retried.

use async_trait::async_trait;
use serde::Deserialize;

use portaria_core::channel::Channel;

use crate::sender::{ChannelSender, SendOutcome, SendRequest};

/// Configuration for one provider gateway, loaded per channel.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
}

impl GatewayConfig {
    /// Load a channel's gateway from `GATEWAY_<CHANNEL>_URL` and
    /// `GATEWAY_<CHANNEL>_TOKEN`. Returns `None` when the URL is not set,
    /// signalling that the channel is unconfigured for this deployment.
    pub fn from_env(channel: Channel) -> Option<Self> {
        let prefix = match channel {
            Channel::Push => "PUSH",
            Channel::Whatsapp => "WHATSAPP",
            Channel::Sms => "SMS",
            Channel::Voz => "VOZ",
            _ => return None,
        };
        let endpoint = std::env::var(format!("GATEWAY_{prefix}_URL")).ok()?;
        Some(Self {
            endpoint,
            api_token: std::env::var(format!("GATEWAY_{prefix}_TOKEN")).ok(),
        })
    }
}

/// Body the gateway returns on acceptance.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    provider_id: Option<String>,
    custo_centavos: Option<i32>,
    /// Voice gateways report billed call minutes.
    minutos: Option<i32>,
}

/// Sends through an HTTP provider gateway.
pub struct GatewaySender {
    channel: Channel,
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewaySender {
    pub fn new(channel: Channel, config: GatewayConfig, client: reqwest::Client) -> Self {
        Self {
            channel,
            config,
            client,
        }
    }

    /// The channel-specific destination field for the request body.
    fn destination(&self, request: &SendRequest) -> Option<serde_json::Value> {
        match self.channel {
            Channel::Push => request.push_tokens.clone(),
            Channel::Whatsapp => request
                .whatsapp_numero
                .as_deref()
                .map(|n| serde_json::json!(n)),
            Channel::Sms => request.sms_numero.as_deref().map(|n| serde_json::json!(n)),
            Channel::Voz => request.voz_numero.as_deref().map(|n| serde_json::json!(n)),
            _ => None,
        }
    }
}

#[async_trait]
impl ChannelSender for GatewaySender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, request: &SendRequest) -> SendOutcome {
        // The resolver only routes to opted-in channels, but preferences
        // can change between fan-out and dispatch.
        let Some(destino) = self.destination(request) else {
            return SendOutcome::Rejected {
                code: "missing_destination".to_string(),
                message: format!("recipient has no {} destination", self.channel),
            };
        };

        let body = serde_json::json!({
            "canal": self.channel.as_str(),
            "destino": destino,
            "titulo": request.titulo,
            "corpo": request.corpo,
            "prioridade": request.prioridade.as_str(),
            "referencia": request.entrega_id,
        });

        let mut http = self.client.post(&self.config.endpoint).json(&body);
        if let Some(token) = &self.config.api_token {
            http = http.bearer_auth(token);
        }

        let response = match http.send().await {
            Ok(response) => response,
            Err(e) => {
                return SendOutcome::TransientError {
                    code: "connect_failed".to_string(),
                    message: e.to_string(),
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            let parsed = response.json::<GatewayResponse>().await.unwrap_or(
                GatewayResponse {
                    provider_id: None,
                    custo_centavos: None,
                    minutos: None,
                },
            );
            tracing::info!(
                canal = %self.channel,
                entrega_id = request.entrega_id,
                provider_id = parsed.provider_id.as_deref().unwrap_or("-"),
                "Gateway accepted delivery"
            );
            SendOutcome::Accepted {
                provider_id: parsed.provider_id,
                response: None,
                custo_centavos: parsed.custo_centavos,
                units: parsed.minutos.unwrap_or(1).max(1),
            }
        } else if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            SendOutcome::Rejected {
                code: format!("http_{}", status.as_u16()),
                message,
            }
        } else {
            let message = response.text().await.unwrap_or_default();
            SendOutcome::TransientError {
                code: format!("http_{}", status.as_u16()),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_returns_none_without_url() {
        std::env::remove_var("GATEWAY_SMS_URL");
        assert!(GatewayConfig::from_env(Channel::Sms).is_none());
    }

    #[test]
    fn internal_channels_have_no_gateway() {
        assert!(GatewayConfig::from_env(Channel::InApp).is_none());
        assert!(GatewayConfig::from_env(Channel::Mural).is_none());
    }
}
