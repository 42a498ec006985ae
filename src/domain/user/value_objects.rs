use serde::{Deserialize, Serialize};

use crate::event_sourcing::core::ObjectDetails;
use super::errors::UserError;

// ============================================================================
// User Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl UserState {
    pub fn exists(self) -> bool {
        matches!(self, UserState::Active | UserState::Inactive)
    }
}

/// User email address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    pub fn parse(email: &str) -> Result<Self, UserError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(UserError::EmptyEmail);
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(Self(email.to_string())),
            _ => Err(UserError::InvalidEmail(email.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Input of add_human_user
#[derive(Debug, Clone, Default)]
pub struct AddHuman {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Defaults to "first last"
    pub display_name: Option<String>,
    pub email: String,
    pub preferred_language: Option<String>,
}

/// Changeset of a profile change; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
}

impl ProfileChanges {
    pub fn validate(&self) -> Result<(), UserError> {
        if self.first_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(UserError::EmptyFirstName);
        }
        if self.last_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(UserError::EmptyLastName);
        }
        Ok(())
    }
}

/// Result of adding a user
#[derive(Debug, Clone, PartialEq)]
pub struct HumanUser {
    pub id: String,
    pub username: String,
    pub state: UserState,
    pub details: ObjectDetails,
}
