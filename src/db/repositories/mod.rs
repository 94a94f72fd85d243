//! Database repositories
//!
//! One repository per relation. Each trait is the store contract used by the
//! services; the `Sqlx*` implementations dispatch on the pool's driver.

pub mod session;
pub mod slot;
pub mod user;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use slot::{SlotRepository, SqlxSlotRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Whether an error (or anything in its context chain) is a unique-key violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false)
    })
}
