//! Integration test common infrastructure.
//!
//! Provides a scriptable in-memory chat transport and a harness that wires
//! the dispatcher, relay engine, and an in-memory database together.

// Each test binary uses a different subset of the harness
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relaycast::handlers::{App, Dispatcher};
use relaycast::store::{Database, User};
use relaycast::transport::{
    ChatTransport, Event, InlineKeyboard, MessageId, ReplyRef, Sender, TransportError, UserId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// One recorded copyMessage call.
#[derive(Debug, Clone)]
pub struct CopyCall {
    pub from_chat: UserId,
    pub to_chat: UserId,
    pub message_id: MessageId,
    pub reply_to: Option<MessageId>,
    pub markup: Option<InlineKeyboard>,
    /// The copy id the mock assigned.
    pub assigned: MessageId,
}

/// One recorded editMessageText call.
#[derive(Debug, Clone)]
pub struct EditCall {
    pub chat: UserId,
    pub message_id: MessageId,
    pub text: String,
    pub markup: Option<InlineKeyboard>,
}

/// One recorded sendMessage call.
#[derive(Debug, Clone)]
pub struct SentCall {
    pub chat: UserId,
    pub text: String,
}

/// Scriptable transport double. Assigns incrementing copy ids starting at 100
/// and records every outgoing call for assertions.
#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicI64,
    unreachable: Mutex<HashSet<UserId>>,
    failing_deletes: Mutex<HashSet<(UserId, MessageId)>>,
    pub copies: Mutex<Vec<CopyCall>>,
    pub edits: Mutex<Vec<EditCall>>,
    pub deletes: Mutex<Vec<(UserId, MessageId)>>,
    pub sent: Mutex<Vec<SentCall>>,
    pub answered_callbacks: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self { next_id: AtomicI64::new(100), ..Default::default() }
    }

    /// Make every future call targeting this chat fail as unreachable.
    pub fn mark_unreachable(&self, user_id: UserId) {
        self.unreachable.lock().insert(user_id);
    }

    /// Make the delete of one specific copy fail with a generic API error.
    pub fn fail_delete(&self, chat: UserId, message_id: MessageId) {
        self.failing_deletes.lock().insert((chat, message_id));
    }

    /// The copy id assigned for `original` in `to_chat`'s feed, if one was sent.
    pub fn copy_assigned(&self, to_chat: UserId, original: MessageId) -> Option<MessageId> {
        self.copies
            .lock()
            .iter()
            .find(|c| c.to_chat == to_chat && c.message_id == original)
            .map(|c| c.assigned)
    }

    /// All plain messages sent to one chat.
    pub fn sent_texts(&self, chat: UserId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.chat == chat)
            .map(|s| s.text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn copy_message(
        &self,
        from_chat: UserId,
        to_chat: UserId,
        message_id: MessageId,
        reply_to: Option<MessageId>,
        markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        if self.unreachable.lock().contains(&to_chat) {
            return Err(TransportError::Unreachable);
        }
        let assigned = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.copies.lock().push(CopyCall {
            from_chat,
            to_chat,
            message_id,
            reply_to,
            markup,
            assigned,
        });
        Ok(assigned)
    }

    async fn edit_message_text(
        &self,
        chat: UserId,
        message_id: MessageId,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> Result<(), TransportError> {
        if self.unreachable.lock().contains(&chat) {
            return Err(TransportError::Unreachable);
        }
        self.edits.lock().push(EditCall { chat, message_id, text: text.to_string(), markup });
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: UserId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        if self.failing_deletes.lock().contains(&(chat, message_id)) {
            return Err(TransportError::Api {
                code: 400,
                description: "message can't be deleted".into(),
            });
        }
        self.deletes.lock().push((chat, message_id));
        Ok(())
    }

    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        _markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        self.sent.lock().push(SentCall { chat, text: text.to_string() });
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        _text: &str,
    ) -> Result<(), TransportError> {
        self.answered_callbacks.lock().push(callback_id.to_string());
        Ok(())
    }
}

/// A bot wired to an in-memory database and the mock transport.
pub struct TestBot {
    pub db: Database,
    pub transport: Arc<MockTransport>,
    pub dispatcher: Dispatcher,
}

impl TestBot {
    pub async fn new() -> Self {
        let db = Database::new(":memory:").await.expect("in-memory database");
        let transport = Arc::new(MockTransport::new());
        let app = Arc::new(App::new(db.clone(), transport.clone(), 60));
        let dispatcher = Dispatcher::new(app);
        Self { db, transport, dispatcher }
    }

    pub async fn register(&self, user_id: UserId) {
        self.db.users().upsert(&User::new(user_id)).await.unwrap();
    }

    pub async fn register_admin(&self, user_id: UserId) {
        self.db
            .users()
            .upsert(&User { user_id, admin: true, vip: false })
            .await
            .unwrap();
    }

    pub async fn register_vip(&self, user_id: UserId) {
        self.db
            .users()
            .upsert(&User { user_id, admin: false, vip: true })
            .await
            .unwrap();
    }

    pub fn sender(user_id: UserId) -> Sender {
        Sender { id: user_id, username: None }
    }

    /// Dispatch a plain new-message event.
    pub async fn send(&self, from: UserId, message_id: MessageId, text: &str) {
        self.dispatcher
            .dispatch(Event::NewMessage {
                from: Self::sender(from),
                id: message_id,
                reply_to: None,
                text: Some(text.to_string()),
            })
            .await;
    }

    /// Dispatch a new-message event replying to another message.
    pub async fn send_reply(
        &self,
        from: UserId,
        message_id: MessageId,
        text: &str,
        reply_to: ReplyRef,
    ) {
        self.dispatcher
            .dispatch(Event::NewMessage {
                from: Self::sender(from),
                id: message_id,
                reply_to: Some(reply_to),
                text: Some(text.to_string()),
            })
            .await;
    }

    /// Dispatch an edited-message event.
    pub async fn edit(&self, from: UserId, message_id: MessageId, text: &str) {
        self.dispatcher
            .dispatch(Event::EditedMessage {
                from: Self::sender(from),
                id: message_id,
                text: Some(text.to_string()),
            })
            .await;
    }
}
