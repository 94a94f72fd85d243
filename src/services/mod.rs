//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They apply
//! the authorization policy, enforce the booking rules and translate store
//! failures into typed errors.

pub mod booking;
pub mod password;
pub mod policy;
pub mod seed;
pub mod session;
pub mod user;

pub use booking::{AssignedGroup, BookingError, BookingService};
pub use password::{hash_password, verify_password};
pub use policy::{authorize, Action, AssignedScope, Denied};
pub use session::{SessionError, SessionService};
pub use user::{CreateUserInput, UserService, UserServiceError};
