//! Chat transport boundary.
//!
//! The core consumes four per-chat operations (copy, edit, delete, send) and
//! produces events for incoming messages, edits, and settings callbacks. The
//! only transport signal the core interprets is [`TransportError::Unreachable`],
//! which maps to directory pruning; every other failure is logged and isolated
//! to the recipient it occurred for.

mod telegram;

pub use telegram::TelegramTransport;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Opaque recipient identifier. For direct chats the chat id is the user id.
pub type UserId = i64;

/// Per-chat message identifier, assigned by the transport at send time.
pub type MessageId = i64;

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The recipient blocked the bot or deactivated their account.
    /// Permanent; the core prunes the recipient from the directory.
    #[error("recipient unreachable")]
    Unreachable,

    #[error("api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Api { .. } => "api_error",
            Self::Http(_) => "http_error",
            Self::Decode(_) => "decode_error",
        }
    }
}

/// An inline keyboard attached to an outgoing or edited message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// A keyboard with a single button.
    pub fn single(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineButton {
                text: text.into(),
                callback_data: callback_data.into(),
            }]],
        }
    }
}

/// The author of an incoming event.
#[derive(Debug, Clone)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
}

/// The message an incoming message replies to.
#[derive(Debug, Clone, Copy)]
pub struct ReplyRef {
    pub message_id: MessageId,
    /// Whether the replied-to message was authored by the bot, i.e. is a
    /// relayed copy rather than the replier's own original.
    pub from_bot: bool,
}

/// Events produced by the transport for the core.
#[derive(Debug, Clone)]
pub enum Event {
    NewMessage {
        from: Sender,
        id: MessageId,
        reply_to: Option<ReplyRef>,
        text: Option<String>,
    },
    EditedMessage {
        from: Sender,
        id: MessageId,
        text: Option<String>,
    },
    CallbackQuery {
        from: Sender,
        message_id: MessageId,
        callback_id: String,
        data: String,
    },
}

/// Operations the core performs against the chat service.
///
/// All calls carry per-call timeouts inside the implementation; the core does
/// not retry or back off on failure.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Copy a message into another chat, returning the copy's id there.
    async fn copy_message(
        &self,
        from_chat: UserId,
        to_chat: UserId,
        message_id: MessageId,
        reply_to: Option<MessageId>,
        markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, TransportError>;

    /// Replace the text (and markup) of a previously sent message.
    async fn edit_message_text(
        &self,
        chat: UserId,
        message_id: MessageId,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> Result<(), TransportError>;

    /// Delete a previously sent message.
    async fn delete_message(&self, chat: UserId, message_id: MessageId)
    -> Result<(), TransportError>;

    /// Send a plain text message, returning its id.
    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, TransportError>;

    /// Acknowledge a callback query with a short notification.
    async fn answer_callback(&self, callback_id: &str, text: &str)
    -> Result<(), TransportError>;
}
