//! Sample data
//!
//! Fills an empty store with a handful of accounts and upcoming slots so the
//! application can be tried out right away. Used by the `booker-seed` binary
//! and by the HTTP tests.

use crate::db::repositories::{
    SessionRepository, SlotRepository, SqlxSessionRepository, SqlxSlotRepository,
    SqlxUserRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{NewSlot, Role, User};
use crate::services::user::{CreateUserInput, UserService, UserServiceError};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};

/// (display name, username, password, role)
pub const SAMPLE_USERS: [(&str, &str, &str, Role); 4] = [
    ("Admin", "admin", "admin", Role::Admin),
    ("Andrzej", "pracownik", "roku", Role::Employee),
    ("Fabian", "pracownik2", "miesiaca", Role::Employee),
    ("bob", "bob", "123", Role::Customer),
];

/// Upcoming one-hour slots created per employee
pub const SLOTS_PER_EMPLOYEE: i64 = 5;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub users_created: usize,
    pub users_skipped: usize,
    pub slots_created: usize,
}

/// Insert the sample users and slots, starting one hour after `now`.
///
/// Users whose username already exists are left untouched; slots are still
/// created for existing employees.
pub async fn fill_with_sample_data(pool: &DynDatabasePool, now: DateTime<Utc>) -> Result<SeedReport> {
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let slot_repo = SqlxSlotRepository::new(pool.clone());
    let users = UserService::new(user_repo.clone());
    let mut report = SeedReport::default();

    let mut employees: Vec<User> = Vec::new();
    for (name, username, password, role) in SAMPLE_USERS {
        let user = match users
            .insert(CreateUserInput::new(name, username, password, role))
            .await
        {
            Ok(user) => {
                report.users_created += 1;
                user
            }
            Err(UserServiceError::UserExists(_)) => {
                report.users_skipped += 1;
                user_repo
                    .get_by_username(username)
                    .await?
                    .with_context(|| format!("User {} vanished during seeding", username))?
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to create sample user")),
        };

        if user.role == Role::Employee {
            employees.push(user);
        }
    }

    let base = now
        .duration_trunc(Duration::minutes(1))
        .context("Failed to round seed start time")?;

    for employee in &employees {
        for i in 1..=SLOTS_PER_EMPLOYEE {
            let start = base + Duration::hours(i);
            let slot = NewSlot::new(start, start + Duration::hours(1), employee.id);
            slot_repo
                .create(&slot)
                .await
                .with_context(|| format!("Failed to create sample slot for {}", employee.username))?;
            report.slots_created += 1;
        }
    }

    tracing::info!(
        users_created = report.users_created,
        users_skipped = report.users_skipped,
        slots_created = report.slots_created,
        "Sample data loaded"
    );
    Ok(report)
}

/// Delete every slot, session and user. Dependent rows go first.
pub async fn reset(pool: &DynDatabasePool) -> Result<()> {
    for table in ["slots", "sessions", "users"] {
        let removed = pool
            .execute(&format!("DELETE FROM {}", table))
            .await
            .with_context(|| format!("Failed to clear {}", table))?;
        tracing::info!(table, removed, "Cleared table");
    }
    Ok(())
}

/// Drop sessions that expired before `now`
pub async fn purge_expired_sessions(pool: &DynDatabasePool, now: DateTime<Utc>) -> Result<u64> {
    let removed = SqlxSessionRepository::new(pool.clone())
        .delete_expired(now)
        .await?;
    tracing::info!(removed, "Purged expired sessions");
    Ok(removed)
}
