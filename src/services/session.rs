//! Session service
//!
//! Issues session tokens at login and maps a presented token back to a user.
//! Expiry is lazy: an expired session is deleted when it is next looked up,
//! nothing sweeps the table in the background.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime in hours
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session store fault: {0}")]
    StoreFault(#[from] anyhow::Error),
}

pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self::with_ttl(sessions, users, Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }

    pub fn with_ttl(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a fresh session for `user_id`, valid for the configured lifetime.
    pub async fn issue(&self, user_id: i64) -> Result<Session, SessionError> {
        // Whole seconds, matching what the store keeps
        let now = DateTime::<Utc>::from_timestamp(Utc::now().timestamp(), 0)
            .context("System clock out of range")?;

        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + self.ttl,
        };

        let session = self
            .sessions
            .create(&session)
            .await
            .context("Failed to store session")?;

        tracing::debug!(user_id, expires_at = %session.expires_at, "Issued session");
        Ok(session)
    }

    /// Resolve the user behind a session token.
    ///
    /// No token, an unknown token and an expired token all resolve to
    /// `None`. A live session whose user no longer exists is a store fault.
    pub async fn resolve_user(&self, token: Option<&str>) -> Result<Option<User>, SessionError> {
        self.resolve_user_at(token, Utc::now()).await
    }

    pub async fn resolve_user_at(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, SessionError> {
        let Some(token) = token else {
            return Ok(None);
        };

        let Some(session) = self
            .sessions
            .get_by_token(token)
            .await
            .context("Failed to look up session")?
        else {
            return Ok(None);
        };

        if session.is_expired_at(now) {
            self.sessions
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            tracing::debug!(user_id = session.user_id, "Reaped expired session");
            return Ok(None);
        }

        let user = self
            .users
            .get_by_id(session.user_id)
            .await
            .context("Failed to load session user")?
            .with_context(|| format!("Session refers to missing user {}", session.user_id))?;

        Ok(Some(user))
    }

    /// Delete a session. Unknown tokens are ignored.
    pub async fn terminate(&self, token: &str) -> Result<(), SessionError> {
        self.sessions
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::Role;

    async fn setup() -> (DynDatabasePool, SessionService, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let user = users
            .create(&User::new(
                "bob".into(),
                "bob".into(),
                "hash".into(),
                Role::Customer,
            ))
            .await
            .unwrap();
        let service = SessionService::new(SqlxSessionRepository::boxed(pool.clone()), users);

        (pool, service, user)
    }

    #[tokio::test]
    async fn test_issue_then_resolve() {
        let (_pool, service, user) = setup().await;

        let session = service.issue(user.id).await.unwrap();
        assert_eq!(session.token.len(), 36);
        assert!(session.expires_at > Utc::now() + Duration::hours(11));

        let resolved = service.resolve_user(Some(&session.token)).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let (_pool, service, user) = setup().await;

        let a = service.issue(user.id).await.unwrap();
        let b = service.issue(user.id).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_is_anonymous() {
        let (_pool, service, _user) = setup().await;

        assert!(service.resolve_user(None).await.unwrap().is_none());
        assert!(service.resolve_user(Some("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_reaped_on_lookup() {
        let (pool, service, user) = setup().await;
        let session = service.issue(user.id).await.unwrap();
        let later = session.expires_at + Duration::seconds(1);

        let resolved = service.resolve_user_at(Some(&session.token), later).await.unwrap();
        assert!(resolved.is_none());

        let repo = SqlxSessionRepository::new(pool);
        assert!(repo.get_by_token(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_valid_until_expiry_instant() {
        let (_pool, service, user) = setup().await;
        let session = service.issue(user.id).await.unwrap();

        let resolved = service
            .resolve_user_at(Some(&session.token), session.expires_at)
            .await
            .unwrap();
        assert!(resolved.is_some());
    }

    #[tokio::test]
    async fn test_terminate() {
        let (_pool, service, user) = setup().await;
        let session = service.issue(user.id).await.unwrap();

        service.terminate(&session.token).await.unwrap();
        service.terminate(&session.token).await.unwrap();

        assert!(service.resolve_user(Some(&session.token)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_store_is_a_fault() {
        let (pool, service, _user) = setup().await;
        pool.close().await;

        let result = service.resolve_user(Some("anything")).await;
        assert!(matches!(result, Err(SessionError::StoreFault(_))));
    }
}
