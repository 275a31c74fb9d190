//! Telegram Bot API transport.
//!
//! Thin HTTPS client over the Bot API: the four outgoing operations the core
//! needs, long-poll update fetching, and command menu registration. Blocked
//! and deactivated recipients surface as [`TransportError::Unreachable`].

use super::{
    ChatTransport, Event, InlineKeyboard, MessageId, ReplyRef, Sender, TransportError, UserId,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Extra headroom on the HTTP timeout over the long-poll timeout.
const POLL_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Timeout for ordinary (non-polling) API calls.
const CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Telegram Bot API client.
pub struct TelegramTransport {
    http: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
    /// Next update offset for getUpdates.
    offset: AtomicI64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    edited_message: Option<RawMessage>,
    callback_query: Option<RawCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: i64,
    from: Option<RawUser>,
    text: Option<String>,
    reply_to_message: Option<Box<RawMessage>>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    is_bot: bool,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCallbackQuery {
    id: String,
    from: RawUser,
    message: Option<RawMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramTransport {
    /// Create a client for the given bot token.
    pub fn new(token: &str, poll_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + POLL_TIMEOUT_SLACK)
            .build()?;
        Ok(Self {
            http,
            base_url: format!("https://api.telegram.org/bot{token}"),
            poll_timeout,
            offset: AtomicI64::new(0),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let api: ApiResponse<T> = response.json().await?;
        if api.ok
            && let Some(result) = api.result
        {
            return Ok(result);
        }

        let code = api.error_code.unwrap_or(0);
        let description = api.description.unwrap_or_else(|| "unknown error".into());
        if is_unreachable(code, &description) {
            return Err(TransportError::Unreachable);
        }
        Err(TransportError::Api { code, description })
    }

    /// Fetch the next batch of updates via long polling.
    ///
    /// Blocks up to the configured poll timeout when no updates are pending.
    pub async fn poll_updates(&self) -> Result<Vec<Event>, TransportError> {
        let offset = self.offset.load(Ordering::Relaxed);
        let updates: Vec<RawUpdate> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": self.poll_timeout.as_secs(),
                    "allowed_updates": ["message", "edited_message", "callback_query"],
                }),
                self.poll_timeout + POLL_TIMEOUT_SLACK,
            )
            .await?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            // getUpdates confirms everything below the next offset
            self.offset
                .fetch_max(update.update_id + 1, Ordering::Relaxed);
            match convert_update(update) {
                Some(event) => events.push(event),
                None => debug!("skipping update without usable payload"),
            }
        }
        Ok(events)
    }

    /// Register the command menu shown to users.
    pub async fn set_my_commands(
        &self,
        commands: &[(&str, &str)],
    ) -> Result<(), TransportError> {
        let commands: Vec<Value> = commands
            .iter()
            .map(|(command, description)| json!({"command": command, "description": description}))
            .collect();
        let _: bool = self
            .call("setMyCommands", json!({"commands": commands}), CALL_TIMEOUT)
            .await?;
        Ok(())
    }
}

/// Whether an API failure means the recipient is permanently gone.
///
/// Telegram reports both "bot was blocked by the user" and "user is
/// deactivated" as 403 Forbidden.
fn is_unreachable(code: i64, description: &str) -> bool {
    code == 403 && (description.contains("blocked") || description.contains("deactivated"))
}

fn convert_update(update: RawUpdate) -> Option<Event> {
    if let Some(msg) = update.message {
        let from = msg.from?;
        return Some(Event::NewMessage {
            from: Sender { id: from.id, username: from.username },
            id: msg.message_id,
            reply_to: msg.reply_to_message.as_deref().map(reply_ref),
            text: msg.text,
        });
    }
    if let Some(msg) = update.edited_message {
        let from = msg.from?;
        return Some(Event::EditedMessage {
            from: Sender { id: from.id, username: from.username },
            id: msg.message_id,
            text: msg.text,
        });
    }
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(Event::CallbackQuery {
            from: Sender { id: query.from.id, username: query.from.username },
            message_id: message.message_id,
            callback_id: query.id,
            data: query.data?,
        });
    }
    None
}

fn reply_ref(replied: &RawMessage) -> ReplyRef {
    ReplyRef {
        message_id: replied.message_id,
        from_bot: replied.from.as_ref().is_some_and(|u| u.is_bot),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn copy_message(
        &self,
        from_chat: UserId,
        to_chat: UserId,
        message_id: MessageId,
        reply_to: Option<MessageId>,
        markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        let mut body = json!({
            "chat_id": to_chat,
            "from_chat_id": from_chat,
            "message_id": message_id,
        });
        if let Some(reply_to) = reply_to {
            body["reply_to_message_id"] = json!(reply_to);
            // The referenced copy may already be gone on the recipient's side
            body["allow_sending_without_reply"] = json!(true);
        }
        if let Some(markup) = markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        let sent: SentMessage = self.call("copyMessage", body, CALL_TIMEOUT).await?;
        Ok(sent.message_id)
    }

    async fn edit_message_text(
        &self,
        chat: UserId,
        message_id: MessageId,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": chat,
            "message_id": message_id,
            "text": text,
        });
        if let Some(markup) = markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        // Telegram returns the edited message object; we only need success
        let _: Value = self.call("editMessageText", body, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: UserId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({"chat_id": chat, "message_id": message_id}),
                CALL_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        let mut body = json!({"chat_id": chat, "text": text});
        if let Some(markup) = markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        let sent: SentMessage = self.call("sendMessage", body, CALL_TIMEOUT).await?;
        Ok(sent.message_id)
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({"callback_query_id": callback_id, "text": text}),
                CALL_TIMEOUT,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_detection() {
        assert!(is_unreachable(403, "Forbidden: bot was blocked by the user"));
        assert!(is_unreachable(403, "Forbidden: user is deactivated"));
        assert!(!is_unreachable(403, "Forbidden: bot can't initiate conversation"));
        assert!(!is_unreachable(400, "Bad Request: message not found"));
    }

    #[test]
    fn test_convert_new_message_with_reply() {
        let update = RawUpdate {
            update_id: 1,
            message: Some(RawMessage {
                message_id: 10,
                from: Some(RawUser { id: 7, is_bot: false, username: Some("alice".into()) }),
                text: Some("hello".into()),
                reply_to_message: Some(Box::new(RawMessage {
                    message_id: 5,
                    from: Some(RawUser { id: 999, is_bot: true, username: None }),
                    text: None,
                    reply_to_message: None,
                })),
            }),
            edited_message: None,
            callback_query: None,
        };

        match convert_update(update) {
            Some(Event::NewMessage { from, id, reply_to, text }) => {
                assert_eq!(from.id, 7);
                assert_eq!(id, 10);
                assert_eq!(text.as_deref(), Some("hello"));
                let reply = reply_to.unwrap();
                assert_eq!(reply.message_id, 5);
                assert!(reply.from_bot);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_convert_update_without_payload() {
        let update = RawUpdate {
            update_id: 2,
            message: None,
            edited_message: None,
            callback_query: None,
        };
        assert!(convert_update(update).is_none());
    }
}
