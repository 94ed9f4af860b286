use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tranzit_core::messaging::{MessagePayload, Messenger, MessagingError, TemplateKind};
use tranzit_shared::Masked;
use crate::app_config::MessagingConfig;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Delivers customer messages through the Telegram Bot API. The customer's
/// messaging identity is the Telegram chat id.
pub struct TelegramMessenger {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramMessenger {
    pub fn new(config: &MessagingConfig, bot_token: String) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MessagingError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Maps a Bot API reply onto the messaging error taxonomy.
fn classify_response(status: u16, body: &str) -> Result<(), MessagingError> {
    let parsed: Option<TelegramResponse> = serde_json::from_str(body).ok();

    if (200..300).contains(&status) {
        return match parsed {
            Some(reply) if reply.ok => Ok(()),
            Some(reply) => Err(MessagingError::Rejected {
                status,
                body: reply.description.unwrap_or_default(),
            }),
            None => Err(MessagingError::Malformed(format!("unexpected reply: {}", body))),
        };
    }

    let description = parsed
        .and_then(|r| r.description)
        .unwrap_or_else(|| body.to_string());

    // 400 "chat not found" and 403 "bot was blocked by the user" both mean the
    // recipient cannot be reached through this bot.
    if status == 403 || (status == 400 && description.contains("chat not found")) {
        return Err(MessagingError::InvalidRecipient(description));
    }

    Err(MessagingError::Rejected { status, body: description })
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(
        &self,
        recipient_id: &str,
        kind: TemplateKind,
        payload: &MessagePayload,
    ) -> Result<(), MessagingError> {
        if recipient_id.trim().is_empty() {
            return Err(MessagingError::InvalidRecipient("empty chat id".to_string()));
        }

        let request = SendMessageRequest {
            chat_id: recipient_id,
            text: kind.render(payload),
        };

        debug!("Sending {} to chat {}", kind, Masked(recipient_id));

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // The URL embeds the bot token
                let e = e.without_url();
                warn!("Telegram request failed: {}", e);
                MessagingError::Unreachable(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| MessagingError::Unreachable(e.without_url().to_string()))?;

        classify_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use tranzit_core::BookingStatus;

    fn payload() -> MessagePayload {
        MessagePayload {
            booking_id: Uuid::new_v4(),
            booking_number: 5,
            status: BookingStatus::InProgress,
            driver_name: None,
            vehicle_plate: None,
        }
    }

    #[test]
    fn test_classify_success() {
        assert!(classify_response(200, r#"{"ok":true,"result":{}}"#).is_ok());
    }

    #[test]
    fn test_classify_unknown_chat() {
        let err = classify_response(400, r#"{"ok":false,"description":"Bad Request: chat not found"}"#).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidRecipient(_)));
    }

    #[test]
    fn test_classify_blocked_bot() {
        let err = classify_response(403, r#"{"ok":false,"description":"Forbidden: bot was blocked by the user"}"#).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidRecipient(_)));
    }

    #[test]
    fn test_classify_server_error_and_garbage() {
        assert!(matches!(
            classify_response(502, "Bad Gateway").unwrap_err(),
            MessagingError::Rejected { status: 502, .. }
        ));
        assert!(matches!(
            classify_response(200, "<html>").unwrap_err(),
            MessagingError::Malformed(_)
        ));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config = MessagingConfig {
            api_base: "https://example.test/".to_string(),
            ..MessagingConfig::default()
        };
        let messenger = TelegramMessenger::new(&config, "42:token".to_string()).unwrap();
        assert_eq!(messenger.endpoint(), "https://example.test/bot42:token/sendMessage");
    }

    #[tokio::test]
    async fn test_empty_recipient_rejected_without_request() {
        let messenger = TelegramMessenger::new(&MessagingConfig::default(), "42:token".to_string()).unwrap();
        let err = messenger
            .send_message("  ", TemplateKind::TripStarted, &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let config = MessagingConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 500,
            ..MessagingConfig::default()
        };
        let messenger = TelegramMessenger::new(&config, "42:token".to_string()).unwrap();
        let err = messenger
            .send_message("1001", TemplateKind::TripStarted, &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Unreachable(_)));
    }
}
