//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-bounded credential linking an opaque token to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque token, also the cookie value
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Expired once `now` has passed `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
