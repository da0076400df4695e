//! Internal channels (`in_app`, `mural`).
//!
//! The delivery row itself is the inbox/mural entry, so "sending" is a
//! no-op acceptance; visibility comes from the row reaching `enviado`.

use async_trait::async_trait;

use portaria_core::channel::Channel;

use crate::sender::{ChannelSender, SendOutcome, SendRequest};

/// Accepts deliveries on an internal channel without any provider call.
pub struct InternalSender {
    channel: Channel,
}

impl InternalSender {
    /// `channel` must be an internal one (`in_app` or `mural`).
    pub fn new(channel: Channel) -> Self {
        debug_assert!(!channel.is_external());
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for InternalSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, request: &SendRequest) -> SendOutcome {
        tracing::debug!(
            canal = %self.channel,
            entrega_id = request.entrega_id,
            "Internal delivery materialized"
        );
        SendOutcome::accepted(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portaria_core::status::{NotificationType, Priority};

    #[tokio::test]
    async fn always_accepts() {
        let sender = InternalSender::new(Channel::InApp);
        let request = SendRequest {
            entrega_id: 1,
            notificacao_id: 1,
            condominio_id: 1,
            tipo: NotificationType::Comunicado,
            prioridade: Priority::Normal,
            titulo: "t".to_string(),
            corpo: "c".to_string(),
            destinatario_nome: "n".to_string(),
            destinatario_email: "n@example.com".to_string(),
            whatsapp_numero: None,
            sms_numero: None,
            voz_numero: None,
            push_tokens: None,
            email_remetente: None,
            email_nome_remetente: None,
        };
        assert!(matches!(
            sender.send(&request).await,
            SendOutcome::Accepted { units: 1, .. }
        ));
    }
}
