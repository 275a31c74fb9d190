//! Broadcast and edit event handlers.

use super::App;
use crate::admission::Admission;
use crate::error::RelayResult;
use crate::store::User;
use crate::transport::{MessageId, ReplyRef, Sender};
use tracing::{debug, info};

/// Admit and fan out a new message, then report the outcome to the sender.
pub(super) async fn handle_new_message(
    app: &App,
    from: &Sender,
    message_id: MessageId,
    reply_to: Option<ReplyRef>,
) -> RelayResult<()> {
    let user = get_or_register(app, from.id).await?;

    match app.admission.admit(&user).await? {
        Admission::Allowed => {}
        Admission::Denied { retry_after_secs } => {
            debug!(user_id = from.id, retry_after_secs, "broadcast denied");
            app.transport
                .send_message(
                    from.id,
                    "Please wait 1 minute before sending the next message.",
                    None,
                )
                .await?;
            return Ok(());
        }
    }

    let report = app.engine.broadcast(from, message_id, reply_to).await?;
    let confirmation = format!(
        "Your message was sent to {} users in {:.2} seconds!",
        report.delivered,
        report.elapsed.as_secs_f64()
    );
    app.transport.send_message(from.id, &confirmation, None).await?;
    Ok(())
}

/// Propagate an edit to every recorded copy. No admission check: the content
/// was already admitted when it was broadcast.
pub(super) async fn handle_edited_message(
    app: &App,
    from: &Sender,
    message_id: MessageId,
    text: Option<&str>,
) -> RelayResult<()> {
    let Some(text) = text else {
        // Only text edits can be propagated through the transport
        debug!(user_id = from.id, message_id, "ignoring non-text edit");
        return Ok(());
    };
    app.engine.propagate_edit(from, message_id, text).await?;
    Ok(())
}

/// Fetch the sender's directory entry, creating one on first contact.
async fn get_or_register(app: &App, user_id: i64) -> RelayResult<User> {
    if let Some(user) = app.db.users().get(user_id).await? {
        return Ok(user);
    }
    let user = User::new(user_id);
    app.db.users().upsert(&user).await?;
    info!(user_id, "user registered on first contact");
    Ok(user)
}
