//! User model
//!
//! Users carry one of three roles. Privilege checks go through
//! [`Role::at_least`] instead of comparing raw discriminants, so reordering
//! the enum cannot silently change who may do what.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Login name (unique)
    pub username: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

impl User {
    /// Create a new, not yet persisted user.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(name: String, username: String, password_hash: String, role: Role) -> Self {
        Self {
            id: 0, // Set by the database
            name,
            username,
            password_hash,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Employees and administrators
    pub fn is_employee_or_above(&self) -> bool {
        self.role.at_least(Role::Employee)
    }

    /// Anyone who is neither an employee nor an administrator.
    ///
    /// "Customer" grants nothing beyond being logged in; it is only ever
    /// used as the complement of [`User::is_employee_or_above`].
    pub fn is_customer(&self) -> bool {
        !self.is_employee_or_above()
    }
}

/// User role, from most to least privileged: Admin, Employee, Customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages users and every slot
    Admin,
    /// Creates own slots and sees own assignments
    Employee,
    /// Books open slots
    #[default]
    Customer,
}

impl Role {
    /// Every role, most privileged first
    pub const ALL: [Role; 3] = [Role::Admin, Role::Employee, Role::Customer];

    /// Privilege level; a larger number means more privilege.
    fn privilege(self) -> u8 {
        match self {
            Role::Admin => 2,
            Role::Employee => 1,
            Role::Customer => 0,
        }
    }

    /// Whether this role is at least as privileged as `other`.
    pub fn at_least(self, other: Role) -> bool {
        self.privilege() >= other.privilege()
    }

    /// Every role at least as privileged as `minimum`.
    pub fn at_least_as(minimum: Role) -> Vec<Role> {
        Self::ALL
            .into_iter()
            .filter(|role| role.at_least(minimum))
            .collect()
    }

    /// Human readable label used in templates
    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Employee => "Employee",
            Role::Customer => "Customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Employee => write!(f, "employee"),
            Role::Customer => write!(f, "customer"),
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    /// Accepts role names in any case and the legacy numeric codes `0`, `1`, `2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" | "0" => Ok(Role::Admin),
            "employee" | "1" => Ok(Role::Employee),
            "customer" | "2" => Ok(Role::Customer),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}
