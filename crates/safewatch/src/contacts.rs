//! Emergency contacts and the directory the engine reads them from.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An emergency contact registered by an incident owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Subject that registered this contact.
    pub owner_id: String,
    /// Display name.
    pub name: String,
    /// Phone number for SMS alerts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Email address (stored, not used for alerts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Contact {
    /// Create a contact with no phone or email.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            phone: None,
            email: None,
        }
    }

    /// Set the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The phone number to alert, if one is on file.
    #[must_use]
    pub fn sms_target(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }
}

/// Read-only lookup of an owner's emergency contacts.
pub trait ContactDirectory: Send + Sync + std::fmt::Debug {
    /// List every contact registered by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn list_contacts(&self, owner_id: &str) -> Result<Vec<Contact>>;
}
