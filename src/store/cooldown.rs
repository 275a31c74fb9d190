//! Broadcast cooldown records.
//!
//! One timestamp per user: when their last broadcast was admitted. Ban and
//! unban are point mutations of the same field (far future / far past), not
//! a separate state.

use super::StoreError;
use crate::transport::UserId;
use sqlx::SqlitePool;

/// Repository for cooldown records.
pub struct CooldownRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CooldownRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Unix timestamp of the user's last admitted broadcast, if any.
    pub async fn last_allowed_at(&self, user_id: UserId) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT last_allowed_at FROM cooldowns WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|(ts,)| ts))
    }

    /// Record the timestamp of an admitted broadcast (atomic upsert).
    pub async fn set_last_allowed_at(
        &self,
        user_id: UserId,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cooldowns (user_id, last_allowed_at) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET last_allowed_at = excluded.last_allowed_at
            "#,
        )
        .bind(user_id)
        .bind(timestamp)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let db = Database::new(":memory:").await.unwrap();
        let cooldowns = db.cooldowns();

        assert_eq!(cooldowns.last_allowed_at(1).await.unwrap(), None);

        cooldowns.set_last_allowed_at(1, 100).await.unwrap();
        assert_eq!(cooldowns.last_allowed_at(1).await.unwrap(), Some(100));

        cooldowns.set_last_allowed_at(1, 200).await.unwrap();
        assert_eq!(cooldowns.last_allowed_at(1).await.unwrap(), Some(200));
    }
}
