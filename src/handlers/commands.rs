//! Command handlers: /start, /settings, /admin, /vip, /del, /ban, /unban.
//!
//! Privilege is checked in one place ([`require_admin`]) and consumed
//! uniformly by every privileged command; the dispatcher turns the resulting
//! `PermissionDenied` into the user-visible denial.

use super::App;
use crate::error::{RelayError, RelayResult};
use crate::store::User;
use crate::transport::{InlineKeyboard, MessageId, ReplyRef, Sender, UserId};
use tracing::{debug, info};

const SETTINGS_HEADER: &str = "Display settings:";
const TOGGLE_SHOW_NICKNAME: &str = "toggle_show_nickname_inline";

/// A recognized command with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Command {
    Start,
    Settings,
    Admin(Option<UserId>),
    Vip(Option<UserId>),
    Del,
    Ban,
    Unban,
}

/// Parse a message text as a command.
///
/// Unknown slash commands return `None` and flow into the broadcast path,
/// matching how ordinary text is treated.
pub(super) fn parse(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    // Commands may carry the bot's mention suffix: /start@relaycast_bot
    let name = head.strip_prefix('/')?.split('@').next()?;
    let arg_id = |mut parts: std::str::SplitWhitespace<'_>| parts.next()?.parse::<UserId>().ok();
    match name {
        "start" => Some(Command::Start),
        "settings" => Some(Command::Settings),
        "admin" => Some(Command::Admin(arg_id(parts))),
        "vip" => Some(Command::Vip(arg_id(parts))),
        "del" => Some(Command::Del),
        "ban" => Some(Command::Ban),
        "unban" => Some(Command::Unban),
        _ => None,
    }
}

/// Execute one command for its issuer.
pub(super) async fn handle(
    app: &App,
    from: &Sender,
    reply_to: Option<ReplyRef>,
    command: Command,
) -> RelayResult<()> {
    match command {
        Command::Start => handle_start(app, from).await,
        Command::Settings => handle_settings(app, from).await,
        Command::Admin(target) => handle_grant(app, from, target, Grant::Admin).await,
        Command::Vip(target) => handle_grant(app, from, target, Grant::Vip).await,
        Command::Del => handle_del(app, from, reply_to).await,
        Command::Ban => handle_ban(app, from, reply_to, true).await,
        Command::Unban => handle_ban(app, from, reply_to, false).await,
    }
}

async fn handle_start(app: &App, from: &Sender) -> RelayResult<()> {
    if !app.db.users().exists(from.id).await? {
        app.db.users().upsert(&User::new(from.id)).await?;
        info!(user_id = from.id, "user registered");
    }
    app.transport
        .send_message(from.id, "Hi! Welcome to the relay.", None)
        .await?;
    Ok(())
}

async fn handle_settings(app: &App, from: &Sender) -> RelayResult<()> {
    let settings = app.db.settings().get_or_default(from.id).await?;
    app.transport
        .send_message(
            from.id,
            SETTINGS_HEADER,
            Some(settings_markup(settings.show_nickname_inline)),
        )
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Grant {
    Admin,
    Vip,
}

async fn handle_grant(
    app: &App,
    from: &Sender,
    target: Option<UserId>,
    grant: Grant,
) -> RelayResult<()> {
    require_admin(app, from.id).await?;
    let Some(target) = target else {
        let usage = match grant {
            Grant::Admin => "Usage: /admin <user_id>",
            Grant::Vip => "Usage: /vip <user_id>",
        };
        app.transport.send_message(from.id, usage, None).await?;
        return Ok(());
    };
    match grant {
        Grant::Admin => app.db.users().set_admin(target, true).await?,
        Grant::Vip => app.db.users().set_vip(target, true).await?,
    }
    info!(issuer_id = from.id, target_id = target, ?grant, "privilege granted");
    app.transport.send_message(from.id, "Done!", None).await?;
    Ok(())
}

async fn handle_del(app: &App, from: &Sender, reply_to: Option<ReplyRef>) -> RelayResult<()> {
    let Some(replied) = reply_to else {
        app.transport
            .send_message(from.id, "Reply to the message you want to delete.", None)
            .await?;
        return Ok(());
    };
    let issuer = app
        .db
        .users()
        .get(from.id)
        .await?
        .unwrap_or_else(|| User::new(from.id));
    app.engine.delete_broadcast(&issuer, replied).await?;
    app.transport
        .send_message(from.id, "The message was deleted for all users.", None)
        .await?;
    Ok(())
}

async fn handle_ban(
    app: &App,
    from: &Sender,
    reply_to: Option<ReplyRef>,
    ban: bool,
) -> RelayResult<()> {
    require_admin(app, from.id).await?;
    let Some(replied) = reply_to else {
        app.transport
            .send_message(from.id, "Reply to a message from the user.", None)
            .await?;
        return Ok(());
    };
    let Some(source) = app.engine.resolve_source(from.id, replied).await? else {
        return Err(RelayError::NotFound);
    };

    let target = source.sender_id;
    let reply = if ban {
        app.admission.ban(target).await?;
        format!("User banned!\nId: {target}")
    } else {
        app.admission.unban(target).await?;
        format!("User unbanned!\nId: {target}")
    };
    app.transport.send_message(from.id, &reply, None).await?;
    Ok(())
}

/// Settings toggle callbacks from the inline keyboard.
pub(super) async fn handle_callback(
    app: &App,
    from: &Sender,
    message_id: MessageId,
    callback_id: &str,
    data: &str,
) -> RelayResult<()> {
    if data != TOGGLE_SHOW_NICKNAME {
        debug!(data, "ignoring unknown callback");
        return Ok(());
    }
    let show = app.db.settings().toggle_show_nickname_inline(from.id).await?;
    // Redraw the settings message with the new state
    app.transport
        .edit_message_text(from.id, message_id, SETTINGS_HEADER, Some(settings_markup(show)))
        .await?;
    app.transport.answer_callback(callback_id, "Setting updated.").await?;
    Ok(())
}

/// The single capability check every privileged command goes through.
async fn require_admin(app: &App, user_id: UserId) -> RelayResult<()> {
    match app.db.users().get(user_id).await? {
        Some(user) if user.admin => Ok(()),
        _ => Err(RelayError::PermissionDenied),
    }
}

fn settings_markup(show_nickname_inline: bool) -> InlineKeyboard {
    let state = if show_nickname_inline { "✅" } else { "❌" };
    InlineKeyboard::single(format!("Show nickname: {state}"), TOGGLE_SHOW_NICKNAME)
}
