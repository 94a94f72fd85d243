//! Authorization policy
//!
//! Pure functions from (current user, action) to allow/deny. Nothing here
//! touches the store; callers fetch whatever the decision needs first.

use crate::models::{Role, User};

/// Something a caller wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewOpenSlots,
    ViewLoginPage,
    ViewOwnBookings,
    BookSlot,
    /// Release a slot currently booked by `booked_by`
    UnbookSlot { booked_by: i64 },
    /// Create a slot assigned to `assignee`
    CreateSlot { assignee: i64 },
    CreateUser,
    ViewAssigned,
}

/// Why an action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denied {
    #[error("you need to sign in first")]
    Anonymous,

    #[error("your role does not allow this")]
    InsufficientRole,

    #[error("only the booker or an administrator may do this")]
    NotOwner,
}

/// Which slots the assigned dashboard shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignedScope {
    /// Slots assigned to this employee only
    Own(i64),
    All,
}

pub fn authorize(user: Option<&User>, action: &Action) -> Result<(), Denied> {
    if matches!(action, Action::ViewOpenSlots | Action::ViewLoginPage) {
        return Ok(());
    }

    let user = user.ok_or(Denied::Anonymous)?;

    match *action {
        Action::ViewOpenSlots | Action::ViewLoginPage => Ok(()),
        Action::ViewOwnBookings | Action::BookSlot => Ok(()),
        Action::UnbookSlot { booked_by } => {
            if may_release(user, booked_by) {
                Ok(())
            } else {
                Err(Denied::NotOwner)
            }
        }
        Action::CreateSlot { assignee } => {
            require(user, Role::Employee)?;
            if assignee != user.id {
                require(user, Role::Admin)?;
            }
            Ok(())
        }
        Action::CreateUser => require(user, Role::Admin),
        Action::ViewAssigned => require(user, Role::Employee),
    }
}

/// The booker may release their own slot; an administrator may release any.
pub fn may_release(user: &User, booked_by: i64) -> bool {
    user.id == booked_by || user.is_admin()
}

pub fn assigned_scope(user: Option<&User>) -> Result<AssignedScope, Denied> {
    authorize(user, &Action::ViewAssigned)?;
    match user {
        Some(u) if u.is_admin() => Ok(AssignedScope::All),
        Some(u) => Ok(AssignedScope::Own(u.id)),
        None => Err(Denied::Anonymous),
    }
}

fn require(user: &User, minimum: Role) -> Result<(), Denied> {
    if user.role.at_least(minimum) {
        Ok(())
    } else {
        Err(Denied::InsufficientRole)
    }
}
