//! Slot repository
//!
//! Database operations for bookable slots, including the conditional update
//! that makes booking atomic.
//!
//! - `SlotRepository` trait defining the interface for slot data access
//! - `SqlxSlotRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{from_epoch_seconds, NewSlot, Slot, SlotListing};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Slot repository trait
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Insert an open slot. The range is checked by the schema as well.
    async fn create(&self, slot: &NewSlot) -> Result<Slot>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Slot>>;

    /// Slots nobody has booked yet
    async fn list_open(&self) -> Result<Vec<SlotListing>>;

    async fn list_booked_by(&self, user_id: i64) -> Result<Vec<SlotListing>>;

    async fn list_assigned_to(&self, user_id: i64) -> Result<Vec<SlotListing>>;

    async fn list_all(&self) -> Result<Vec<SlotListing>>;

    /// Unconditionally overwrite `booked_by`.
    ///
    /// Returns `false` when no slot has this id.
    async fn set_booked_by(&self, id: i64, booked_by: Option<i64>) -> Result<bool>;

    /// Overwrite `booked_by` only if it still equals `expected`.
    ///
    /// Returns `false` when the slot is missing or its current value differs,
    /// in which case nothing was written.
    async fn set_booked_by_if(
        &self,
        id: i64,
        expected: Option<i64>,
        booked_by: Option<i64>,
    ) -> Result<bool>;
}

/// SQLx-based slot repository implementation
pub struct SqlxSlotRepository {
    pool: DynDatabasePool,
}

impl SqlxSlotRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SlotRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Which listing to run; all share the same joined projection.
#[derive(Debug, Clone, Copy)]
enum Listing {
    Open,
    BookedBy(i64),
    AssignedTo(i64),
    All,
}

impl Listing {
    fn sql(self) -> String {
        let filter = match self {
            Listing::Open => "WHERE s.booked_by IS NULL",
            Listing::BookedBy(_) => "WHERE s.booked_by = ?",
            Listing::AssignedTo(_) => "WHERE s.assigned_to = ?",
            Listing::All => "",
        };
        format!(
            r#"
            SELECT s.id, s.start_at, s.end_at, s.booked_by, s.assigned_to,
                   a.name AS assigned_to_name, b.name AS booked_by_name
            FROM slots s
            JOIN users a ON a.id = s.assigned_to
            LEFT JOIN users b ON b.id = s.booked_by
            {}
            ORDER BY s.start_at, s.id
            "#,
            filter
        )
    }

    fn user_id(self) -> Option<i64> {
        match self {
            Listing::BookedBy(id) | Listing::AssignedTo(id) => Some(id),
            Listing::Open | Listing::All => None,
        }
    }
}

impl SqlxSlotRepository {
    async fn list(&self, listing: Listing) -> Result<Vec<SlotListing>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_slots_sqlite(self.pool.sqlite()?, listing).await,
            DatabaseDriver::Mysql => list_slots_mysql(self.pool.mysql()?, listing).await,
        }
    }
}

#[async_trait]
impl SlotRepository for SqlxSlotRepository {
    async fn create(&self, slot: &NewSlot) -> Result<Slot> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_slot_sqlite(self.pool.sqlite()?, slot).await,
            DatabaseDriver::Mysql => create_slot_mysql(self.pool.mysql()?, slot).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Slot>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_slot_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_slot_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list_open(&self) -> Result<Vec<SlotListing>> {
        self.list(Listing::Open).await
    }

    async fn list_booked_by(&self, user_id: i64) -> Result<Vec<SlotListing>> {
        self.list(Listing::BookedBy(user_id)).await
    }

    async fn list_assigned_to(&self, user_id: i64) -> Result<Vec<SlotListing>> {
        self.list(Listing::AssignedTo(user_id)).await
    }

    async fn list_all(&self) -> Result<Vec<SlotListing>> {
        self.list(Listing::All).await
    }

    async fn set_booked_by(&self, id: i64, booked_by: Option<i64>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_booked_by_sqlite(self.pool.sqlite()?, id, booked_by).await
            }
            DatabaseDriver::Mysql => set_booked_by_mysql(self.pool.mysql()?, id, booked_by).await,
        }
    }

    async fn set_booked_by_if(
        &self,
        id: i64,
        expected: Option<i64>,
        booked_by: Option<i64>,
    ) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_booked_by_if_sqlite(self.pool.sqlite()?, id, expected, booked_by).await
            }
            DatabaseDriver::Mysql => {
                set_booked_by_if_mysql(self.pool.mysql()?, id, expected, booked_by).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_slot_sqlite(pool: &SqlitePool, slot: &NewSlot) -> Result<Slot> {
    let result = sqlx::query(
        r#"
        INSERT INTO slots (start_at, end_at, booked_by, assigned_to)
        VALUES (?, ?, NULL, ?)
        "#,
    )
    .bind(slot.start_at.timestamp())
    .bind(slot.end_at.timestamp())
    .bind(slot.assigned_to)
    .execute(pool)
    .await
    .context("Failed to create slot")?;

    Ok(Slot {
        id: result.last_insert_rowid(),
        start_at: slot.start_at,
        end_at: slot.end_at,
        booked_by: None,
        assigned_to: slot.assigned_to,
    })
}

async fn get_slot_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Slot>> {
    let row = sqlx::query(
        r#"
        SELECT id, start_at, end_at, booked_by, assigned_to
        FROM slots
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get slot by ID")?;

    row.as_ref().map(row_to_slot_sqlite).transpose()
}

async fn list_slots_sqlite(pool: &SqlitePool, listing: Listing) -> Result<Vec<SlotListing>> {
    let sql = listing.sql();
    let mut query = sqlx::query(&sql);
    if let Some(user_id) = listing.user_id() {
        query = query.bind(user_id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list slots ({:?})", listing))?;

    rows.iter()
        .map(|row| {
            Ok(SlotListing {
                slot: row_to_slot_sqlite(row)?,
                assigned_to_name: row.get("assigned_to_name"),
                booked_by_name: row.get("booked_by_name"),
            })
        })
        .collect()
}

async fn set_booked_by_sqlite(pool: &SqlitePool, id: i64, booked_by: Option<i64>) -> Result<bool> {
    let result = sqlx::query("UPDATE slots SET booked_by = ? WHERE id = ?")
        .bind(booked_by)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update slot booking")?;

    Ok(result.rows_affected() == 1)
}

async fn set_booked_by_if_sqlite(
    pool: &SqlitePool,
    id: i64,
    expected: Option<i64>,
    booked_by: Option<i64>,
) -> Result<bool> {
    // `IS` compares NULL as a value, so one statement covers open and booked
    let result = sqlx::query("UPDATE slots SET booked_by = ? WHERE id = ? AND booked_by IS ?")
        .bind(booked_by)
        .bind(id)
        .bind(expected)
        .execute(pool)
        .await
        .context("Failed to conditionally update slot booking")?;

    Ok(result.rows_affected() == 1)
}

fn row_to_slot_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Slot> {
    Ok(Slot {
        id: row.get("id"),
        start_at: from_epoch_seconds(row.get("start_at"))?,
        end_at: from_epoch_seconds(row.get("end_at"))?,
        booked_by: row.get("booked_by"),
        assigned_to: row.get("assigned_to"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_slot_mysql(pool: &MySqlPool, slot: &NewSlot) -> Result<Slot> {
    let result = sqlx::query(
        r#"
        INSERT INTO slots (start_at, end_at, booked_by, assigned_to)
        VALUES (?, ?, NULL, ?)
        "#,
    )
    .bind(slot.start_at.timestamp())
    .bind(slot.end_at.timestamp())
    .bind(slot.assigned_to)
    .execute(pool)
    .await
    .context("Failed to create slot")?;

    Ok(Slot {
        id: result.last_insert_id() as i64,
        start_at: slot.start_at,
        end_at: slot.end_at,
        booked_by: None,
        assigned_to: slot.assigned_to,
    })
}

async fn get_slot_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Slot>> {
    let row = sqlx::query(
        r#"
        SELECT id, start_at, end_at, booked_by, assigned_to
        FROM slots
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get slot by ID")?;

    row.as_ref().map(row_to_slot_mysql).transpose()
}

async fn list_slots_mysql(pool: &MySqlPool, listing: Listing) -> Result<Vec<SlotListing>> {
    let sql = listing.sql();
    let mut query = sqlx::query(&sql);
    if let Some(user_id) = listing.user_id() {
        query = query.bind(user_id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list slots ({:?})", listing))?;

    rows.iter()
        .map(|row| {
            Ok(SlotListing {
                slot: row_to_slot_mysql(row)?,
                assigned_to_name: row.get("assigned_to_name"),
                booked_by_name: row.get("booked_by_name"),
            })
        })
        .collect()
}

async fn set_booked_by_mysql(pool: &MySqlPool, id: i64, booked_by: Option<i64>) -> Result<bool> {
    // MySQL reports changed rows only, so existence is checked separately
    let result = sqlx::query("UPDATE slots SET booked_by = ? WHERE id = ?")
        .bind(booked_by)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update slot booking")?;

    if result.rows_affected() == 1 {
        return Ok(true);
    }
    Ok(get_slot_by_id_mysql(pool, id).await?.is_some())
}

async fn set_booked_by_if_mysql(
    pool: &MySqlPool,
    id: i64,
    expected: Option<i64>,
    booked_by: Option<i64>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE slots SET booked_by = ? WHERE id = ? AND booked_by <=> ?")
        .bind(booked_by)
        .bind(id)
        .bind(expected)
        .execute(pool)
        .await
        .context("Failed to conditionally update slot booking")?;

    Ok(result.rows_affected() == 1)
}

fn row_to_slot_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Slot> {
    Ok(Slot {
        id: row.get("id"),
        start_at: from_epoch_seconds(row.get("start_at"))?,
        end_at: from_epoch_seconds(row.get("end_at"))?,
        booked_by: row.get("booked_by"),
        assigned_to: row.get("assigned_to"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Role, SlotStatus, User};
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        repo: SqlxSlotRepository,
        employee: User,
        other_employee: User,
        customer: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let create = |name: &str, username: &str, role| {
            User::new(name.into(), username.into(), "h".into(), role)
        };
        let employee = users
            .create(&create("Andrzej", "pracownik", Role::Employee))
            .await
            .unwrap();
        let other_employee = users
            .create(&create("Fabian", "pracownik2", Role::Employee))
            .await
            .unwrap();
        let customer = users
            .create(&create("bob", "bob", Role::Customer))
            .await
            .unwrap();

        Fixture {
            repo: SqlxSlotRepository::new(pool),
            employee,
            other_employee,
            customer,
        }
    }

    fn new_slot(hour: u32, assigned_to: i64) -> NewSlot {
        let start = Utc.with_ymd_and_hms(2022, 7, 13, hour, 30, 0).unwrap();
        NewSlot::new(start, start + Duration::hours(1), assigned_to)
    }

    #[tokio::test]
    async fn test_create_and_get_slot() {
        let f = setup().await;
        let created = f.repo.create(&new_slot(11, f.employee.id)).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.status(), SlotStatus::Open);

        let found = f.repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_get_missing_slot_returns_none() {
        let f = setup().await;
        assert!(f.repo.get_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_inverted_range() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2022, 7, 13, 12, 30, 0).unwrap();
        let inverted = NewSlot::new(start, start - Duration::hours(1), f.employee.id);

        assert!(f.repo.create(&inverted).await.is_err());
    }

    #[tokio::test]
    async fn test_listings_follow_booking_state() {
        let f = setup().await;
        let first = f.repo.create(&new_slot(9, f.employee.id)).await.unwrap();
        let second = f.repo.create(&new_slot(10, f.other_employee.id)).await.unwrap();

        assert!(f.repo.set_booked_by(first.id, Some(f.customer.id)).await.unwrap());

        let open = f.repo.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].slot.id, second.id);
        assert_eq!(open[0].assigned_to_name, "Fabian");
        assert_eq!(open[0].booked_by_name, None);

        let booked = f.repo.list_booked_by(f.customer.id).await.unwrap();
        assert_eq!(booked.len(), 1);
        assert_eq!(booked[0].slot.id, first.id);
        assert_eq!(booked[0].booked_by_name.as_deref(), Some("bob"));

        let assigned = f.repo.list_assigned_to(f.employee.id).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].assigned_to_name, "Andrzej");

        let all = f.repo.list_all().await.unwrap();
        let ids: Vec<i64> = all.iter().map(|l| l.slot.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_set_booked_by_missing_slot() {
        let f = setup().await;
        assert!(!f.repo.set_booked_by(77, Some(f.customer.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_booked_by_if_compares_current_value() {
        let f = setup().await;
        let slot = f.repo.create(&new_slot(11, f.employee.id)).await.unwrap();

        // Open -> booked succeeds once
        assert!(f
            .repo
            .set_booked_by_if(slot.id, None, Some(f.customer.id))
            .await
            .unwrap());
        assert!(!f
            .repo
            .set_booked_by_if(slot.id, None, Some(f.employee.id))
            .await
            .unwrap());

        // Wrong expected booker leaves the row alone
        assert!(!f
            .repo
            .set_booked_by_if(slot.id, Some(f.employee.id), None)
            .await
            .unwrap());
        let current = f.repo.get_by_id(slot.id).await.unwrap().unwrap();
        assert_eq!(current.booked_by, Some(f.customer.id));

        // Correct expected booker releases it
        assert!(f
            .repo
            .set_booked_by_if(slot.id, Some(f.customer.id), None)
            .await
            .unwrap());
        assert_eq!(f.repo.get_by_id(slot.id).await.unwrap().unwrap().status(), SlotStatus::Open);

        // Missing slot
        assert!(!f.repo.set_booked_by_if(999, None, Some(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_booking_unknown_user_violates_foreign_key() {
        let f = setup().await;
        let slot = f.repo.create(&new_slot(11, f.employee.id)).await.unwrap();

        assert!(f.repo.set_booked_by(slot.id, Some(12345)).await.is_err());
    }
}
