//! Per-user display settings repository.
//!
//! Settings rows are created lazily on first access with documented defaults
//! and never explicitly deleted; a row orphaned by directory pruning is
//! harmless.

use super::StoreError;
use crate::transport::UserId;
use sqlx::SqlitePool;

/// Per-user display preferences.
///
/// Defaults: every flag off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub user_id: UserId,
    /// Attach an inline button with the sender's nickname to relayed copies.
    pub show_nickname_inline: bool,
}

impl Settings {
    fn defaults(user_id: UserId) -> Self {
        Self { user_id, show_nickname_inline: false }
    }
}

/// Repository for settings operations.
pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a user's settings, creating the default row on first access.
    pub async fn get_or_default(&self, user_id: UserId) -> Result<Settings, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "SELECT user_id, show_nickname_inline FROM settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        if let Some((user_id, show_nickname_inline)) = row {
            return Ok(Settings { user_id, show_nickname_inline });
        }

        let defaults = Settings::defaults(user_id);
        // Another event for the same user may have raced us; keep theirs.
        sqlx::query(
            "INSERT INTO settings (user_id, show_nickname_inline) VALUES (?, ?) \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(defaults.user_id)
        .bind(defaults.show_nickname_inline)
        .execute(self.pool)
        .await?;
        Ok(defaults)
    }

    /// Flip the show-nickname flag, returning the new value.
    pub async fn toggle_show_nickname_inline(
        &self,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let current = self.get_or_default(user_id).await?.show_nickname_inline;
        let next = !current;
        sqlx::query("UPDATE settings SET show_nickname_inline = ? WHERE user_id = ?")
            .bind(next)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    #[tokio::test]
    async fn test_lazy_defaults() {
        let db = Database::new(":memory:").await.unwrap();
        let settings = db.settings().get_or_default(9).await.unwrap();
        assert!(!settings.show_nickname_inline);

        // Second read sees the persisted row, not a fresh default
        let again = db.settings().get_or_default(9).await.unwrap();
        assert_eq!(settings, again);
    }

    #[tokio::test]
    async fn test_toggle_roundtrip() {
        let db = Database::new(":memory:").await.unwrap();
        assert!(db.settings().toggle_show_nickname_inline(9).await.unwrap());
        assert!(db.settings().get_or_default(9).await.unwrap().show_nickname_inline);
        assert!(!db.settings().toggle_show_nickname_inline(9).await.unwrap());
    }
}
