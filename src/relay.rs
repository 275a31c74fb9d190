//! Relay engine: concurrent fan-out of broadcasts, edits, and deletions.
//!
//! One logical event moves through `Admitted -> Fanning-out -> Settled`: the
//! engine loads the current directory, issues every per-recipient transport
//! operation concurrently, joins on all of them, and writes the results back
//! into the ledger. One recipient's failure never blocks the others; an
//! unreachable recipient is pruned from the directory with their ledger
//! records cascaded away.
//!
//! Known consistency window: an edit or delete that races ahead of the
//! original send's record write silently affects nothing for that recipient.
//! That is accepted degraded behaviour, not an error.

use crate::error::{RelayError, RelayResult};
use crate::store::{Database, RelayRecord, StoreError, User};
use crate::transport::{
    ChatTransport, InlineKeyboard, MessageId, ReplyRef, Sender, TransportError, UserId,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Suffix appended to propagated edits so recipients can tell the message changed.
const EDITED_SUFFIX: &str = " (edited)";

/// Outcome of one settled broadcast.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastReport {
    /// Recipients whose copy was delivered.
    pub delivered: usize,
    /// Recipients attempted.
    pub attempted: usize,
    /// Wall-clock time from fan-out start to settle.
    pub elapsed: Duration,
}

/// The relay engine. Holds its collaborators explicitly; there are no
/// process-wide singletons behind it.
#[derive(Clone)]
pub struct RelayEngine {
    db: Database,
    transport: Arc<dyn ChatTransport>,
}

impl RelayEngine {
    pub fn new(db: Database, transport: Arc<dyn ChatTransport>) -> Self {
        Self { db, transport }
    }

    /// Fan a newly admitted message out to every directory entry.
    ///
    /// The sender is included as a recipient on purpose: every user, the
    /// sender too, sees the broadcast as a bot-delivered copy in their feed.
    pub async fn broadcast(
        &self,
        from: &Sender,
        message_id: MessageId,
        reply_to: Option<ReplyRef>,
    ) -> RelayResult<BroadcastReport> {
        let markup = self.nickname_markup(from).await?;
        let recipients = self.db.users().all().await?;
        let attempted = recipients.len();

        let started = Instant::now();
        let deliveries = recipients.iter().map(|recipient| {
            self.deliver_one(from.id, message_id, reply_to, recipient, markup.clone())
        });
        let delivered = join_all(deliveries).await.into_iter().filter(|ok| *ok).count();
        let elapsed = started.elapsed();

        info!(
            sender_id = from.id,
            original_id = message_id,
            delivered,
            attempted,
            elapsed_ms = elapsed.as_millis() as u64,
            "broadcast settled"
        );
        Ok(BroadcastReport { delivered, attempted, elapsed })
    }

    /// Copy one message to one recipient and record the mapping.
    ///
    /// Returns whether the copy was delivered. Never propagates an error:
    /// unreachable recipients are pruned, everything else is logged.
    async fn deliver_one(
        &self,
        sender_id: UserId,
        original_id: MessageId,
        reply_to: Option<ReplyRef>,
        recipient: &User,
        markup: Option<InlineKeyboard>,
    ) -> bool {
        let reply_target = match reply_to {
            Some(replied) => self
                .resolve_reply_for(replied, recipient.user_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(
                        recipient_id = recipient.user_id,
                        error = %e,
                        "reply resolution failed, sending un-threaded"
                    );
                    None
                }),
            None => None,
        };

        let copy_id = match self
            .transport
            .copy_message(sender_id, recipient.user_id, original_id, reply_target, markup)
            .await
        {
            Ok(copy_id) => copy_id,
            Err(TransportError::Unreachable) => {
                self.prune_recipient(recipient.user_id).await;
                return false;
            }
            Err(e) => {
                warn!(
                    recipient_id = recipient.user_id,
                    error_code = e.error_code(),
                    error = %e,
                    "copy failed"
                );
                return false;
            }
        };

        let record = RelayRecord {
            sender_id,
            sender_copy_id: original_id,
            original_id,
            recipient_id: recipient.user_id,
            recipient_copy_id: copy_id,
        };
        match self.db.ledger().record(&record).await {
            Ok(()) => {}
            Err(StoreError::DuplicateMapping { original_id, recipient_id }) => {
                // A concurrent duplicate event already recorded this pair
                debug!(original_id, recipient_id, "duplicate mapping ignored");
            }
            Err(e) => {
                warn!(
                    recipient_id = recipient.user_id,
                    error = %e,
                    "copy delivered but mapping not recorded"
                );
            }
        }
        true
    }

    async fn resolve_reply_for(
        &self,
        replied: ReplyRef,
        recipient_id: UserId,
    ) -> Result<Option<MessageId>, StoreError> {
        // A reply to a non-bot message is a reply to the replier's own
        // broadcast; a reply to a bot message threads through the copy.
        self.db
            .ledger()
            .resolve_reply_target(replied.message_id, !replied.from_bot, recipient_id)
            .await
    }

    /// Propagate an edit of a previously broadcast message to every copy.
    ///
    /// Edits bypass admission: they only touch content that was already
    /// admitted. Recipients pruned since the broadcast are simply absent
    /// from the record set.
    pub async fn propagate_edit(
        &self,
        from: &Sender,
        original_id: MessageId,
        text: &str,
    ) -> RelayResult<usize> {
        let markup = self.nickname_markup(from).await?;
        let records = self.db.ledger().find_by_sender_original(from.id, original_id).await?;
        let text = format!("{text}{EDITED_SUFFIX}");

        let edits = records.iter().map(|record| {
            let markup = markup.clone();
            let text = &text;
            async move {
                match self
                    .transport
                    .edit_message_text(record.recipient_id, record.recipient_copy_id, text, markup)
                    .await
                {
                    Ok(()) => true,
                    Err(TransportError::Unreachable) => {
                        self.prune_recipient(record.recipient_id).await;
                        false
                    }
                    Err(e) => {
                        warn!(
                            recipient_id = record.recipient_id,
                            copy_id = record.recipient_copy_id,
                            error = %e,
                            "edit failed"
                        );
                        false
                    }
                }
            }
        });
        let edited = join_all(edits).await.into_iter().filter(|ok| *ok).count();

        info!(sender_id = from.id, original_id, edited, "edit propagated");
        Ok(edited)
    }

    /// Delete a broadcast everywhere, resolved from a replied-to message.
    ///
    /// The issuer must be an admin or the original sender. Copies whose
    /// transport delete fails keep their ledger record, since the copy may
    /// still exist on that recipient's side.
    pub async fn delete_broadcast(
        &self,
        issuer: &User,
        replied: ReplyRef,
    ) -> RelayResult<usize> {
        let Some(source) = self.resolve_source(issuer.user_id, replied).await? else {
            return Err(RelayError::NotFound);
        };
        if !issuer.admin && issuer.user_id != source.sender_id {
            return Err(RelayError::PermissionDenied);
        }

        let records = self
            .db
            .ledger()
            .find_by_sender_original(source.sender_id, source.original_id)
            .await?;

        let deletions = records.iter().map(|record| async move {
            match self
                .transport
                .delete_message(record.recipient_id, record.recipient_copy_id)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        recipient_id = record.recipient_id,
                        copy_id = record.recipient_copy_id,
                        error = %e,
                        "delete failed, retaining record"
                    );
                    false
                }
            }
        });
        let outcomes = join_all(deletions).await;

        let deleted = outcomes.iter().filter(|ok| **ok).count();
        if deleted == records.len() {
            // Clean cascade: drop the whole broadcast from the ledger at once
            self.db
                .ledger()
                .delete_by_sender_copy(source.sender_id, source.sender_copy_id)
                .await?;
        } else {
            for (record, ok) in records.iter().zip(outcomes) {
                if ok {
                    self.db.ledger().remove(record.original_id, record.recipient_id).await?;
                }
            }
        }

        info!(
            issuer_id = issuer.user_id,
            sender_id = source.sender_id,
            original_id = source.original_id,
            deleted,
            "broadcast deleted"
        );
        Ok(deleted)
    }

    /// Reverse-lookup the broadcast a replied-to message belongs to.
    ///
    /// Supports both a user replying to their own original and a user
    /// replying to a bot-delivered copy in their chat. Used by delete and
    /// by ban/unban target resolution.
    pub async fn resolve_source(
        &self,
        issuer_id: UserId,
        replied: ReplyRef,
    ) -> Result<Option<RelayRecord>, StoreError> {
        if replied.from_bot {
            self.db.ledger().find_by_recipient_copy(issuer_id, replied.message_id).await
        } else {
            self.db.ledger().find_one_by_original(replied.message_id).await
        }
    }

    /// Remove an unreachable recipient and cascade their ledger records.
    async fn prune_recipient(&self, user_id: UserId) {
        if let Err(e) = self.db.users().remove(user_id).await {
            warn!(user_id, error = %e, "failed to prune unreachable user");
            return;
        }
        match self.db.ledger().delete_by_recipient(user_id).await {
            Ok(purged) => info!(user_id, purged, "pruned unreachable user"),
            Err(e) => warn!(user_id, error = %e, "failed to purge ledger for pruned user"),
        }
    }

    /// Inline nickname button for this sender's copies, when enabled.
    async fn nickname_markup(&self, from: &Sender) -> Result<Option<InlineKeyboard>, StoreError> {
        let settings = self.db.settings().get_or_default(from.id).await?;
        if !settings.show_nickname_inline {
            return Ok(None);
        }
        let user = self.db.users().get(from.id).await?.unwrap_or_else(|| User::new(from.id));
        Ok(Some(nickname_button(&user, from.username.as_deref())))
    }
}

/// Build the inline button showing the sender's tier and nickname.
fn nickname_button(user: &User, username: Option<&str>) -> InlineKeyboard {
    let nickname = match username {
        Some(name) => name.to_string(),
        None => format!("id{}", user.user_id),
    };
    let mut label = String::new();
    if user.vip {
        label.push_str("VIP");
    }
    if user.admin {
        label.push_str("ADMIN");
    }
    label.push(' ');
    label.push_str(&nickname);
    InlineKeyboard::single(label, "user")
}
