//! User directory repository.
//!
//! Directory entries are the authoritative recipient list for fan-out.
//! A user is created on first contact and removed only when the transport
//! reports them permanently unreachable.

use super::StoreError;
use crate::transport::UserId;
use sqlx::SqlitePool;

/// A registered user with privilege flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub admin: bool,
    pub vip: bool,
}

impl User {
    /// A fresh, unprivileged directory entry.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, admin: false, vip: false }
    }

    /// Privileged users bypass the broadcast cooldown.
    pub fn is_privileged(&self) -> bool {
        self.admin || self.vip
    }
}

/// Repository for directory operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite a directory entry.
    pub async fn upsert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, admin, vip)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET admin = excluded.admin, vip = excluded.vip
            "#,
        )
        .bind(user.user_id)
        .bind(user.admin)
        .bind(user.vip)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Look up one user.
    pub async fn get(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool, bool)>(
            "SELECT user_id, admin, vip FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|(user_id, admin, vip)| User { user_id, admin, vip }))
    }

    /// Whether a directory entry exists for this user.
    pub async fn exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.get(user_id).await?.is_some())
    }

    /// The full recipient list.
    pub async fn all(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, bool, bool)>("SELECT user_id, admin, vip FROM users")
            .fetch_all(self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, admin, vip)| User { user_id, admin, vip })
            .collect())
    }

    /// Remove a permanently unreachable user. The caller cascades ledger cleanup.
    pub async fn remove(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Set the admin flag, creating the entry if needed. Leaves vip untouched.
    pub async fn set_admin(&self, user_id: UserId, admin: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, admin, vip) VALUES (?, ?, 0)
            ON CONFLICT(user_id) DO UPDATE SET admin = excluded.admin
            "#,
        )
        .bind(user_id)
        .bind(admin)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Set the vip flag, creating the entry if needed. Leaves admin untouched.
    pub async fn set_vip(&self, user_id: UserId, vip: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, admin, vip) VALUES (?, 0, ?)
            ON CONFLICT(user_id) DO UPDATE SET vip = excluded.vip
            "#,
        )
        .bind(user_id)
        .bind(vip)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = Database::new(":memory:").await.unwrap();
        let users = db.users();

        users.upsert(&User::new(1)).await.unwrap();
        let user = users.get(1).await.unwrap().unwrap();
        assert!(!user.admin);
        assert!(!user.vip);
        assert!(!user.is_privileged());

        assert!(users.get(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flag_mutations_are_independent() {
        let db = Database::new(":memory:").await.unwrap();
        let users = db.users();

        // Grants create the entry on demand
        users.set_admin(5, true).await.unwrap();
        users.set_vip(5, true).await.unwrap();
        let user = users.get(5).await.unwrap().unwrap();
        assert!(user.admin && user.vip);

        // Stripping one flag leaves the other alone
        users.set_vip(5, false).await.unwrap();
        let user = users.get(5).await.unwrap().unwrap();
        assert!(user.admin);
        assert!(!user.vip);
        assert!(user.is_privileged());
    }

    #[tokio::test]
    async fn test_all_and_remove() {
        let db = Database::new(":memory:").await.unwrap();
        let users = db.users();

        users.upsert(&User::new(1)).await.unwrap();
        users.upsert(&User::new(2)).await.unwrap();
        users.upsert(&User::new(3)).await.unwrap();
        assert_eq!(users.all().await.unwrap().len(), 3);

        users.remove(2).await.unwrap();
        let remaining: Vec<_> = users.all().await.unwrap().iter().map(|u| u.user_id).collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&2));
    }
}
