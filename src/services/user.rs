//! User service
//!
//! Account creation by administrators, credential checks at login, and the
//! bootstrap administrator created on first start.

use crate::config::BootstrapConfig;
use crate::db::repositories::{is_unique_violation, UserRepository};
use crate::models::{Role, User};
use crate::services::password::{hash_password, verify_password};
use crate::services::policy::{self, Action};
use anyhow::Context;
use std::sync::Arc;

/// Message shown for any failed login, whether the username or the password was wrong
pub const INVALID_CREDENTIALS: &str = "invalid username or password";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Forbidden: {0}")]
    Forbidden(#[from] policy::Denied),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for creating an account
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub name: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl CreateUserInput {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: password.into(),
            role,
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// Create an account on behalf of `actor`, who must be an administrator.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the actor is not an administrator
    /// - `ValidationError` if a field is blank
    /// - `UserExists` if the username is taken
    pub async fn create_user(
        &self,
        input: CreateUserInput,
        actor: Option<&User>,
    ) -> Result<User, UserServiceError> {
        policy::authorize(actor, &Action::CreateUser)?;
        let user = self.insert(input).await?;

        tracing::info!(
            user_id = user.id,
            role = %user.role,
            created_by = actor.map(|u| u.id),
            "User created"
        );
        Ok(user)
    }

    /// Check a username and password.
    ///
    /// Unknown usernames and wrong passwords produce the same error.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to look up user")?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_CREDENTIALS.into()))?;

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = user.id, "Password mismatch");
            return Err(UserServiceError::AuthenticationError(
                INVALID_CREDENTIALS.into(),
            ));
        }

        Ok(user)
    }

    /// Create the configured administrator when no user exists yet.
    ///
    /// Returns the new administrator, or `None` when bootstrapping is
    /// disabled or the store already has users.
    pub async fn ensure_bootstrap_admin(
        &self,
        config: &BootstrapConfig,
    ) -> Result<Option<User>, UserServiceError> {
        if !config.enabled {
            return Ok(None);
        }

        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        if count > 0 {
            return Ok(None);
        }

        let admin = self
            .insert(CreateUserInput::new(
                config.name.clone(),
                config.username.clone(),
                config.password.clone(),
                Role::Admin,
            ))
            .await?;

        tracing::info!(user_id = admin.id, username = %admin.username, "Created bootstrap administrator");
        if config.uses_default_password() {
            tracing::warn!("Bootstrap administrator uses the default password; change it");
        }
        Ok(Some(admin))
    }

    /// Hash, check for duplicates and store. No authorization.
    pub(crate) async fn insert(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let name = input.name.trim();
        let username = input.username.trim();

        if name.is_empty() {
            return Err(UserServiceError::ValidationError("name is required".into()));
        }
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "username is required".into(),
            ));
        }
        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "password is required".into(),
            ));
        }

        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        if existing.is_some() {
            return Err(UserServiceError::UserExists(username.to_string()));
        }

        let hash = hash_password(&input.password)?;
        let user = User::new(name.to_string(), username.to_string(), hash, input.role);

        // The pre-check can race with another insert; the unique index decides
        match self.user_repo.create(&user).await {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => {
                Err(UserServiceError::UserExists(username.to_string()))
            }
            Err(e) => Err(UserServiceError::InternalError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::services::policy::Denied;

    async fn setup_test_service() -> (Arc<dyn UserRepository>, UserService, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let repo = SqlxUserRepository::boxed(pool);
        let service = UserService::new(repo.clone());
        let admin = service
            .insert(CreateUserInput::new("Admin", "admin", "admin", Role::Admin))
            .await
            .expect("Failed to create admin");

        (repo, service, admin)
    }

    #[tokio::test]
    async fn test_admin_creates_user_with_hashed_password() {
        let (_repo, service, admin) = setup_test_service().await;

        let user = service
            .create_user(
                CreateUserInput::new("Andrzej", "pracownik", "roku", Role::Employee),
                Some(&admin),
            )
            .await
            .unwrap();

        assert_eq!(user.role, Role::Employee);
        assert_ne!(user.password_hash, "roku");
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_create_user() {
        let (_repo, service, admin) = setup_test_service().await;
        let employee = service
            .create_user(
                CreateUserInput::new("Andrzej", "pracownik", "roku", Role::Employee),
                Some(&admin),
            )
            .await
            .unwrap();

        let input = CreateUserInput::new("bob", "bob", "123", Role::Customer);
        let result = service.create_user(input.clone(), Some(&employee)).await;
        assert!(matches!(
            result,
            Err(UserServiceError::Forbidden(Denied::InsufficientRole))
        ));

        let result = service.create_user(input, None).await;
        assert!(matches!(
            result,
            Err(UserServiceError::Forbidden(Denied::Anonymous))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_creates_no_row() {
        let (repo, service, admin) = setup_test_service().await;

        let result = service
            .create_user(
                CreateUserInput::new("Other", "admin", "x", Role::Customer),
                Some(&admin),
            )
            .await;

        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let (_repo, service, admin) = setup_test_service().await;

        for input in [
            CreateUserInput::new("", "u", "p", Role::Customer),
            CreateUserInput::new("n", "  ", "p", Role::Customer),
            CreateUserInput::new("n", "u", "", Role::Customer),
        ] {
            let result = service.create_user(input, Some(&admin)).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (_repo, service, admin) = setup_test_service().await;

        let user = service.authenticate("admin", "admin").await.unwrap();
        assert_eq!(user.id, admin.id);

        for (username, password) in [("admin", "wrong"), ("nobody", "admin")] {
            let result = service.authenticate(username, password).await;
            assert!(
                matches!(result, Err(UserServiceError::AuthenticationError(ref m)) if m == INVALID_CREDENTIALS)
            );
        }
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_on_empty_store() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = UserService::new(SqlxUserRepository::boxed(pool));
        let config = BootstrapConfig::default();

        let created = service.ensure_bootstrap_admin(&config).await.unwrap();
        let admin = created.expect("bootstrap admin should be created");
        assert!(admin.is_admin());
        assert_eq!(admin.username, config.username);

        assert!(service.ensure_bootstrap_admin(&config).await.unwrap().is_none());
        assert!(service.authenticate(&config.username, &config.password).await.is_ok());
    }

    #[tokio::test]
    async fn test_bootstrap_disabled() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = UserService::new(SqlxUserRepository::boxed(pool));
        let config = BootstrapConfig {
            enabled: false,
            ..BootstrapConfig::default()
        };

        assert!(service.ensure_bootstrap_admin(&config).await.unwrap().is_none());
    }
}
