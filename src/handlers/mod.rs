//! Event dispatch.
//!
//! Routes transport events to the command handlers or the broadcast path.
//! Every event is handled independently; a failed or malformed event is
//! logged (and answered where the error warrants a user-visible reply) and
//! never takes the loop down.

mod broadcast;
mod commands;

use crate::admission::AdmissionController;
use crate::error::RelayError;
use crate::relay::RelayEngine;
use crate::store::Database;
use crate::transport::{ChatTransport, Event, UserId};
use std::sync::Arc;
use tracing::{error, warn};

/// Shared collaborators, passed explicitly into every handler.
pub struct App {
    pub db: Database,
    pub transport: Arc<dyn ChatTransport>,
    pub admission: AdmissionController,
    pub engine: RelayEngine,
}

impl App {
    pub fn new(db: Database, transport: Arc<dyn ChatTransport>, cooldown_secs: i64) -> Self {
        let admission = AdmissionController::new(db.clone(), cooldown_secs);
        let engine = RelayEngine::new(db.clone(), transport.clone());
        Self { db, transport, admission, engine }
    }
}

/// Routes one event at a time; cheap to clone, one per in-flight event.
#[derive(Clone)]
pub struct Dispatcher {
    app: Arc<App>,
}

impl Dispatcher {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// Handle one incoming event end to end. Never fails the caller.
    pub async fn dispatch(&self, event: Event) {
        let issuer = event_issuer(&event);
        if let Err(e) = self.route(event).await {
            error!(error_code = e.error_code(), error = %e, "event handling failed");
            if let Some(reply) = e.user_reply()
                && let Err(send_err) = self.app.transport.send_message(issuer, reply, None).await
            {
                warn!(user_id = issuer, error = %send_err, "failed to deliver error reply");
            }
        }
    }

    async fn route(&self, event: Event) -> Result<(), RelayError> {
        match event {
            Event::NewMessage { from, id, reply_to, text } => {
                if let Some(command) = text.as_deref().and_then(commands::parse) {
                    commands::handle(&self.app, &from, reply_to, command).await
                } else {
                    broadcast::handle_new_message(&self.app, &from, id, reply_to).await
                }
            }
            Event::EditedMessage { from, id, text } => {
                broadcast::handle_edited_message(&self.app, &from, id, text.as_deref()).await
            }
            Event::CallbackQuery { from, message_id, callback_id, data } => {
                commands::handle_callback(&self.app, &from, message_id, &callback_id, &data).await
            }
        }
    }
}

fn event_issuer(event: &Event) -> UserId {
    match event {
        Event::NewMessage { from, .. }
        | Event::EditedMessage { from, .. }
        | Event::CallbackQuery { from, .. } => from.id,
    }
}
