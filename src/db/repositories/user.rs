//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Role, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; fails on a duplicate username (see `is_unique_violation`)
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Users whose role is at least `role`, ordered by id
    async fn list_by_role_at_least(&self, role: Role) -> Result<Vec<User>>;

    /// Count all users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_username_sqlite(self.pool.sqlite()?, username).await
            }
            DatabaseDriver::Mysql => get_user_by_username_mysql(self.pool.mysql()?, username).await,
        }
    }

    async fn list_by_role_at_least(&self, role: Role) -> Result<Vec<User>> {
        let roles = Role::at_least_as(role);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_by_roles_sqlite(self.pool.sqlite()?, &roles).await,
            DatabaseDriver::Mysql => list_users_by_roles_mysql(self.pool.mysql()?, &roles).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?).await,
        }
    }
}

const USER_COLUMNS: &str = "id, name, username, password, role";

fn roles_query(roles: &[Role]) -> String {
    let placeholders = vec!["?"; roles.len()].join(", ");
    format!(
        "SELECT {} FROM users WHERE role IN ({}) ORDER BY id",
        USER_COLUMNS, placeholders
    )
}

fn parse_role(role: &str) -> Result<Role> {
    Role::from_str(role).with_context(|| format!("Invalid role in database: {}", role))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, username, password, role)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_username_sqlite(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn list_users_by_roles_sqlite(pool: &SqlitePool, roles: &[Role]) -> Result<Vec<User>> {
    let sql = roles_query(roles);
    let mut query = sqlx::query(&sql);
    for role in roles {
        query = query.bind(role.to_string());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list users by role")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        username: row.get("username"),
        password_hash: row.get("password"),
        role: parse_role(&role)?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, username, password, role)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_username_mysql(pool: &MySqlPool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn list_users_by_roles_mysql(pool: &MySqlPool, roles: &[Role]) -> Result<Vec<User>> {
    let sql = roles_query(roles);
    let mut query = sqlx::query(&sql);
    for role in roles {
        query = query.bind(role.to_string());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list users by role")?;

    rows.iter().map(row_to_user_mysql).collect()
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.get("role");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        username: row.get("username"),
        password_hash: row.get("password"),
        role: parse_role(&role)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::is_unique_violation;
    use crate::db::{create_test_pool, migrations};
    use crate::services::password::hash_password;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_user(username: &str, role: Role) -> User {
        User::new(
            username.to_uppercase(),
            username.to_string(),
            "not-a-real-hash".to_string(),
            role,
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&test_user("bob", Role::Customer))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.name, "BOB");
        assert_eq!(created.username, "bob");
        assert_eq!(created.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_get_user_by_id() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&test_user("ann", Role::Employee)).await.unwrap();

        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(found.id, created.id);
        assert_eq!(found.role, Role::Employee);
    }

    #[tokio::test]
    async fn test_get_missing_user_returns_none() {
        let (_pool, repo) = setup_test_repo().await;

        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_user_by_username() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("findme", Role::Admin)).await.unwrap();

        let found = repo
            .get_by_username("findme")
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(found.username, "findme");
        assert!(found.is_admin());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("dup", Role::Customer)).await.unwrap();

        let err = repo
            .create(&test_user("dup", Role::Employee))
            .await
            .expect_err("Duplicate username must fail");

        assert!(is_unique_violation(&err));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_by_role_at_least() {
        let (_pool, repo) = setup_test_repo().await;
        let admin = repo.create(&test_user("admin", Role::Admin)).await.unwrap();
        let emp = repo.create(&test_user("emp", Role::Employee)).await.unwrap();
        repo.create(&test_user("cust", Role::Customer)).await.unwrap();

        let staff = repo.list_by_role_at_least(Role::Employee).await.unwrap();
        let ids: Vec<i64> = staff.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![admin.id, emp.id]);

        let admins = repo.list_by_role_at_least(Role::Admin).await.unwrap();
        assert_eq!(admins.len(), 1);

        let everyone = repo.list_by_role_at_least(Role::Customer).await.unwrap();
        assert_eq!(everyone.len(), 3);
    }

    #[tokio::test]
    async fn test_count_users() {
        let (_pool, repo) = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        repo.create(&test_user("a", Role::Customer)).await.unwrap();
        repo.create(&test_user("b", Role::Customer)).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_password_hash_stored_correctly() {
        let (_pool, repo) = setup_test_repo().await;
        let hash = hash_password("my_secure_password").expect("Failed to hash password");
        let user = User::new("H".into(), "hashtest".into(), hash.clone(), Role::Customer);

        let created = repo.create(&user).await.unwrap();
        let found = repo.get_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(found.password_hash, hash);
        assert!(found.password_hash.starts_with("$argon2id$"));
    }
}
