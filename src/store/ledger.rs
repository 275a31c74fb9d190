//! Message mapping ledger.
//!
//! Records, for every (sender, original message) pair, the copy delivered to
//! each recipient. The ledger is the only writer of relay records; the relay
//! engine reads and mutates exclusively through this interface so the
//! consistency invariants stay in one place:
//!
//! - at most one record per (original_id, recipient_id)
//! - recipient_copy_id is assigned by the transport at send time and never
//!   changes (edits reuse it, deletes remove the whole record)
//! - every lookup is a point-in-time snapshot with no ordering promise

use super::StoreError;
use crate::transport::{MessageId, UserId};
use sqlx::SqlitePool;

/// One original-to-copy correspondence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRecord {
    pub sender_id: UserId,
    /// The broadcast's handle on the sender's side. Lets a reply to the
    /// sender's own message be resolved without knowing who received copies.
    pub sender_copy_id: MessageId,
    pub original_id: MessageId,
    pub recipient_id: UserId,
    /// The copy's id in the recipient's chat, immutable once assigned.
    pub recipient_copy_id: MessageId,
}

type Row = (i64, i64, i64, i64, i64);

fn from_row(
    (sender_id, sender_copy_id, original_id, recipient_id, recipient_copy_id): Row,
) -> RelayRecord {
    RelayRecord { sender_id, sender_copy_id, original_id, recipient_id, recipient_copy_id }
}

const COLUMNS: &str = "sender_id, sender_copy_id, original_id, recipient_id, recipient_copy_id";

/// Repository for ledger operations.
pub struct LedgerRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LedgerRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one relay record.
    ///
    /// Fails with [`StoreError::DuplicateMapping`] if a record already exists
    /// for this (original, recipient) pair; callers treat that as a no-op.
    pub async fn record(&self, record: &RelayRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO relay_records
                (sender_id, sender_copy_id, original_id, recipient_id, recipient_copy_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.sender_id)
        .bind(record.sender_copy_id)
        .bind(record.original_id)
        .bind(record.recipient_id)
        .bind(record.recipient_copy_id)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateMapping {
                    original_id: record.original_id,
                    recipient_id: record.recipient_id,
                };
            }
            StoreError::from(e)
        })?;
        Ok(())
    }

    /// All copies produced from one broadcast.
    pub async fn find_by_sender_original(
        &self,
        sender_id: UserId,
        original_id: MessageId,
    ) -> Result<Vec<RelayRecord>, StoreError> {
        let rows = sqlx::query_as::<_, Row>(&format!(
            "SELECT {COLUMNS} FROM relay_records WHERE sender_id = ? AND original_id = ?"
        ))
        .bind(sender_id)
        .bind(original_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// The record describing the copy `recipient_copy_id` in `recipient_id`'s chat.
    pub async fn find_by_recipient_copy(
        &self,
        recipient_id: UserId,
        recipient_copy_id: MessageId,
    ) -> Result<Option<RelayRecord>, StoreError> {
        let row = sqlx::query_as::<_, Row>(&format!(
            "SELECT {COLUMNS} FROM relay_records \
             WHERE recipient_id = ? AND recipient_copy_id = ?"
        ))
        .bind(recipient_id)
        .bind(recipient_copy_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// Any one record of the broadcast whose original is `original_id`.
    pub async fn find_one_by_original(
        &self,
        original_id: MessageId,
    ) -> Result<Option<RelayRecord>, StoreError> {
        let row = sqlx::query_as::<_, Row>(&format!(
            "SELECT {COLUMNS} FROM relay_records WHERE original_id = ?"
        ))
        .bind(original_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// Resolve which copy on `target_recipient_id`'s side a reply should
    /// point at, so reply chains survive the fan-out boundary.
    ///
    /// Two cases: the replied-to message is the replier's own broadcast
    /// (matched through sender_copy_id), or a copy they received from someone
    /// else (matched through its recipient_copy_id, then mapped forward via
    /// the shared original). Returns `None` when no mapping is known, which
    /// the engine degrades to an un-threaded copy.
    pub async fn resolve_reply_target(
        &self,
        replied_to_copy_id: MessageId,
        is_reply_to_own_copy: bool,
        target_recipient_id: UserId,
    ) -> Result<Option<MessageId>, StoreError> {
        let source_match = if is_reply_to_own_copy {
            "source.sender_copy_id = ?"
        } else {
            "source.recipient_copy_id = ?"
        };
        let row = sqlx::query_as::<_, (i64,)>(&format!(
            r#"
            SELECT target.recipient_copy_id
            FROM relay_records source
            JOIN relay_records target ON target.original_id = source.original_id
            WHERE {source_match} AND target.recipient_id = ?
            LIMIT 1
            "#
        ))
        .bind(replied_to_copy_id)
        .bind(target_recipient_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|(copy_id,)| copy_id))
    }

    /// Remove the single record for one (original, recipient) pair.
    ///
    /// Used when cascading a deletion copy by copy: a copy whose transport
    /// delete failed keeps its record, since it may still exist.
    pub async fn remove(
        &self,
        original_id: MessageId,
        recipient_id: UserId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM relay_records WHERE original_id = ? AND recipient_id = ?",
        )
        .bind(original_id)
        .bind(recipient_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove and return every record of one broadcast.
    pub async fn delete_by_sender_copy(
        &self,
        sender_id: UserId,
        sender_copy_id: MessageId,
    ) -> Result<Vec<RelayRecord>, StoreError> {
        let rows = sqlx::query_as::<_, Row>(&format!(
            "DELETE FROM relay_records WHERE sender_id = ? AND sender_copy_id = ? \
             RETURNING {COLUMNS}"
        ))
        .bind(sender_id)
        .bind(sender_copy_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Purge every record for a recipient being removed from the directory.
    pub async fn delete_by_recipient(&self, recipient_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM relay_records WHERE recipient_id = ?")
            .bind(recipient_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
