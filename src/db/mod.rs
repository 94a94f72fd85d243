//! Database layer
//!
//! Record store for users, slots and sessions. Both SQLite (default, one file
//! next to the binary) and MySQL are supported behind the `DatabasePool`
//! trait; the driver is picked from configuration.
//!
//! ```ignore
//! use booker::config::DatabaseConfig;
//! use booker::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
