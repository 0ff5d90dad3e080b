//! Email address type.
//!
//! Checkout forms and the identity provider both hand us raw strings; this
//! type normalizes them (trim, lowercase) and rejects structurally invalid
//! addresses before they reach the backend.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input is empty (or whitespace only).
    #[error("email cannot be empty")]
    Empty,
    /// The input exceeds the RFC 5321 length limit.
    #[error("email must be at most {0} characters")]
    TooLong(usize),
    /// The input is not of the form `local@domain`.
    #[error("email must be of the form local@domain")]
    Malformed,
}

/// A normalized email address.
///
/// Input is trimmed and lowercased on parse, so two addresses that differ
/// only in case or surrounding whitespace compare equal.
///
/// ```
/// use solera_core::Email;
///
/// let a = Email::parse(" User@Example.COM ").unwrap();
/// let b = Email::parse("user@example.com").unwrap();
/// assert_eq!(a, b);
/// assert!(Email::parse("not-an-email").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse and normalize an email address.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] if the input is empty, too long, or not of the
    /// form `local@domain` with both parts non-empty.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(EmailError::Empty);
        }

        if trimmed.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong(Self::MAX_LENGTH));
        }

        match trimmed.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                Ok(Self(trimmed.to_lowercase()))
            }
            _ => Err(EmailError::Malformed),
        }
    }

    /// The normalized address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
