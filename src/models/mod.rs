//! Data models
//!
//! Plain snapshots of persisted records. Callers re-fetch to observe later
//! changes; nothing here is shared mutable state.

mod session;
mod slot;
mod user;

pub use session::Session;
pub use slot::{from_epoch_seconds, NewSlot, Slot, SlotListing, SlotStatus};
pub use user::{Role, User};
