//! Booking service
//!
//! The slot state machine: a slot is Open until someone books it and Booked
//! until the booker (or an administrator) releases it. Both transitions read
//! the slot, decide whether the move is legal, then write through the
//! store's compare-and-set. If another request changed the slot between the
//! read and the write, the write matches nothing and the caller gets
//! `Conflict` instead of overwriting someone else's booking.

use crate::db::repositories::{SlotRepository, UserRepository};
use crate::models::{NewSlot, Role, Slot, SlotListing, SlotStatus, User};
use crate::services::policy::{self, Action, AssignedScope, Denied};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("start time must be before end time")]
    InvalidRange,

    /// The assignee does not exist or is not an employee
    #[error("user {0} cannot be assigned slots")]
    InvalidAssignee(i64),

    #[error("{0}")]
    InvalidTransition(&'static str),

    #[error("slot {0} was changed by another request")]
    Conflict(i64),

    #[error("forbidden: {0}")]
    Forbidden(Denied),

    #[error("login required")]
    Unauthenticated,

    #[error("Store fault: {0}")]
    StoreFault(#[from] anyhow::Error),
}

impl From<Denied> for BookingError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::Anonymous => BookingError::Unauthenticated,
            other => BookingError::Forbidden(other),
        }
    }
}

/// One employee and the slots assigned to them
#[derive(Debug, Clone, Serialize)]
pub struct AssignedGroup {
    pub employee: User,
    pub slots: Vec<SlotListing>,
}

pub struct BookingService {
    slots: Arc<dyn SlotRepository>,
    users: Arc<dyn UserRepository>,
}

impl BookingService {
    pub fn new(slots: Arc<dyn SlotRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { slots, users }
    }

    /// Book an open slot for the acting user.
    ///
    /// Booking a slot that is already booked fails, even when the acting
    /// user is the one holding it.
    pub async fn book(&self, slot_id: i64, actor: Option<&User>) -> Result<Slot, BookingError> {
        policy::authorize(actor, &Action::BookSlot)?;
        let actor = actor.ok_or(BookingError::Unauthenticated)?;

        self.users
            .get_by_id(actor.id)
            .await
            .context("Failed to load booking user")?
            .ok_or(BookingError::NotFound("user"))?;

        let slot = self.load_slot(slot_id).await?;
        if let SlotStatus::Booked { .. } = slot.status() {
            return Err(BookingError::InvalidTransition("slot is already booked"));
        }

        let swapped = self
            .slots
            .set_booked_by_if(slot.id, None, Some(actor.id))
            .await
            .context("Failed to book slot")?;

        if !swapped {
            tracing::warn!(slot_id, user_id = actor.id, "Lost booking race");
            return Err(BookingError::Conflict(slot_id));
        }

        tracing::info!(slot_id, user_id = actor.id, "Slot booked");
        Ok(Slot {
            booked_by: Some(actor.id),
            ..slot
        })
    }

    /// Release a booked slot.
    ///
    /// Only the booker or an administrator may release a slot; anyone else
    /// gets `InvalidTransition`, as does releasing a slot that is open.
    pub async fn unbook(&self, slot_id: i64, actor: Option<&User>) -> Result<Slot, BookingError> {
        let actor = actor.ok_or(BookingError::Unauthenticated)?;
        let slot = self.load_slot(slot_id).await?;

        let SlotStatus::Booked { by: booked_by } = slot.status() else {
            return Err(BookingError::InvalidTransition("slot is not booked"));
        };

        if policy::authorize(Some(actor), &Action::UnbookSlot { booked_by }).is_err() {
            return Err(BookingError::InvalidTransition(
                "slot is booked by another user",
            ));
        }

        let swapped = self
            .slots
            .set_booked_by_if(slot.id, Some(booked_by), None)
            .await
            .context("Failed to unbook slot")?;

        if !swapped {
            tracing::warn!(slot_id, user_id = actor.id, "Lost unbooking race");
            return Err(BookingError::Conflict(slot_id));
        }

        tracing::info!(slot_id, user_id = actor.id, previous = booked_by, "Slot unbooked");
        Ok(Slot {
            booked_by: None,
            ..slot
        })
    }

    /// Create an open slot assigned to `assignee`.
    pub async fn create_slot(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        assignee: i64,
        actor: Option<&User>,
    ) -> Result<Slot, BookingError> {
        policy::authorize(actor, &Action::CreateSlot { assignee })?;

        let new_slot = NewSlot::new(start_at, end_at, assignee);
        if !new_slot.has_valid_range() {
            return Err(BookingError::InvalidRange);
        }

        let employee = self
            .users
            .get_by_id(assignee)
            .await
            .context("Failed to load assignee")?;
        if !employee.is_some_and(|u| u.is_employee_or_above()) {
            return Err(BookingError::InvalidAssignee(assignee));
        }

        let slot = self
            .slots
            .create(&new_slot)
            .await
            .context("Failed to create slot")?;

        tracing::info!(
            slot_id = slot.id,
            assigned_to = assignee,
            created_by = actor.map(|u| u.id),
            "Slot created"
        );
        Ok(slot)
    }

    /// Open slots, visible to everyone
    pub async fn open_slots(&self) -> Result<Vec<SlotListing>, BookingError> {
        Ok(self.slots.list_open().await?)
    }

    /// Slots the acting user has booked
    pub async fn booked_slots(&self, actor: Option<&User>) -> Result<Vec<SlotListing>, BookingError> {
        policy::authorize(actor, &Action::ViewOwnBookings)?;
        let actor = actor.ok_or(BookingError::Unauthenticated)?;
        Ok(self.slots.list_booked_by(actor.id).await?)
    }

    /// Assigned slots grouped by employee.
    ///
    /// An employee sees their own group only. An administrator sees a group
    /// for every employee and administrator, including empty ones.
    pub async fn assigned_slots(
        &self,
        actor: Option<&User>,
    ) -> Result<Vec<AssignedGroup>, BookingError> {
        match policy::assigned_scope(actor)? {
            AssignedScope::Own(user_id) => {
                let employee = self
                    .users
                    .get_by_id(user_id)
                    .await?
                    .ok_or(BookingError::NotFound("user"))?;
                let slots = self.slots.list_assigned_to(user_id).await?;
                Ok(vec![AssignedGroup { employee, slots }])
            }
            AssignedScope::All => {
                let employees = self.users.list_by_role_at_least(Role::Employee).await?;
                let mut slots = self.slots.list_all().await?;

                Ok(employees
                    .into_iter()
                    .map(|employee| {
                        let (mine, rest): (Vec<SlotListing>, Vec<SlotListing>) = slots
                            .drain(..)
                            .partition(|l| l.slot.assigned_to == employee.id);
                        slots = rest;
                        AssignedGroup {
                            employee,
                            slots: mine,
                        }
                    })
                    .collect())
            }
        }
    }

    /// Every user an administrator may assign slots to
    pub async fn assignable_employees(&self) -> Result<Vec<User>, BookingError> {
        Ok(self.users.list_by_role_at_least(Role::Employee).await?)
    }

    async fn load_slot(&self, slot_id: i64) -> Result<Slot, BookingError> {
        self.slots
            .get_by_id(slot_id)
            .await
            .context("Failed to load slot")?
            .ok_or(BookingError::NotFound("slot"))
    }
}
