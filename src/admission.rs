//! Broadcast admission control.
//!
//! Decides whether a user's message may be fanned out right now, based on
//! privilege flags and a sliding cooldown window. Ban and unban reuse the
//! same cooldown record: a ban pushes `last_allowed_at` a year into the
//! future, an unban pushes it one window into the past.
//!
//! The check-then-set on admission is not atomic against concurrent messages
//! from the same user; this is a best-effort rate limiter, not a hard
//! guarantee, and the timestamp is written before fan-out begins so the
//! window for stale reads stays as small as the store allows.

use crate::store::{Database, StoreError, User};
use crate::transport::UserId;
use chrono::{Duration, Utc};
use tracing::{debug, info};

/// How far into the future a ban pushes the cooldown timestamp, in days.
const BAN_HORIZON_DAYS: i64 = 365;

/// Admission decision for one incoming broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Seconds until the user becomes eligible again.
    Denied { retry_after_secs: i64 },
}

/// Admission controller over the cooldown store.
#[derive(Clone)]
pub struct AdmissionController {
    db: Database,
    cooldown_secs: i64,
}

impl AdmissionController {
    pub fn new(db: Database, cooldown_secs: i64) -> Self {
        Self { db, cooldown_secs }
    }

    /// Decide whether this user's message may be broadcast now.
    ///
    /// Admins and VIPs are always admitted with no cooldown side effect.
    /// For everyone else an admission immediately records the timestamp,
    /// before any fan-out work starts.
    pub async fn admit(&self, user: &User) -> Result<Admission, StoreError> {
        if user.is_privileged() {
            return Ok(Admission::Allowed);
        }

        let now = Utc::now().timestamp();
        if let Some(last) = self.db.cooldowns().last_allowed_at(user.user_id).await? {
            let elapsed = now - last;
            if elapsed < self.cooldown_secs {
                debug!(user_id = user.user_id, elapsed, "broadcast denied by cooldown");
                return Ok(Admission::Denied { retry_after_secs: self.cooldown_secs - elapsed });
            }
        }

        self.db.cooldowns().set_last_allowed_at(user.user_id, now).await?;
        Ok(Admission::Allowed)
    }

    /// Ban a user: deny admission until a manual unban, and strip privileges.
    pub async fn ban(&self, user_id: UserId) -> Result<(), StoreError> {
        let until = (Utc::now() + Duration::days(BAN_HORIZON_DAYS)).timestamp();
        self.db.cooldowns().set_last_allowed_at(user_id, until).await?;
        self.db.users().set_admin(user_id, false).await?;
        self.db.users().set_vip(user_id, false).await?;
        info!(user_id, "user banned");
        Ok(())
    }

    /// Unban a user: make them immediately eligible again.
    pub async fn unban(&self, user_id: UserId) -> Result<(), StoreError> {
        let past = (Utc::now() - Duration::seconds(self.cooldown_secs)).timestamp();
        self.db.cooldowns().set_last_allowed_at(user_id, past).await?;
        info!(user_id, "user unbanned");
        Ok(())
    }
}
