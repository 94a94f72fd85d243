//! Slot model
//!
//! A slot is a bookable interval assigned to one employee. It is either open
//! or booked by exactly one user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookable time interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// User holding the booking, `None` while the slot is open
    pub booked_by: Option<i64>,
    /// Employee the slot belongs to
    pub assigned_to: i64,
}

/// Booking state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum SlotStatus {
    Open,
    Booked { by: i64 },
}

impl Slot {
    pub fn status(&self) -> SlotStatus {
        match self.booked_by {
            Some(by) => SlotStatus::Booked { by },
            None => SlotStatus::Open,
        }
    }
}

/// Input for creating a slot
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub assigned_to: i64,
}

impl NewSlot {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>, assigned_to: i64) -> Self {
        Self {
            start_at,
            end_at,
            assigned_to,
        }
    }

    /// Start strictly before end
    pub fn has_valid_range(&self) -> bool {
        self.start_at < self.end_at
    }
}

/// A slot together with the display names of the users it references.
///
/// Listings are what the views show, so they are joined in the store rather
/// than resolved one user at a time.
#[derive(Debug, Clone, Serialize)]
pub struct SlotListing {
    #[serde(flatten)]
    pub slot: Slot,
    pub assigned_to_name: String,
    pub booked_by_name: Option<String>,
}

/// Convert stored epoch seconds into a UTC timestamp.
pub fn from_epoch_seconds(secs: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {}", secs))
}
