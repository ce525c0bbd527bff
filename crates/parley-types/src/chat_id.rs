use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Separator between the two participant ids inside a chat id.
pub const SEPARATOR: char = '_';

/// Longest user id accepted on the wire, in bytes.
pub const MAX_USER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("user id is empty")]
    Empty,

    #[error("user id '{0}' is longer than 128 bytes")]
    TooLong(String),

    #[error("user id '{0}' contains a reserved or non-printable character")]
    Malformed(String),

    #[error("'{0}' is not a chat id")]
    NotAChatId(String),
}

/// Check a single user id. Ids are opaque to the core but must survive being
/// joined into a chat id and split back out.
pub fn validate_user_id(user_id: &str) -> Result<(), IdentityError> {
    if user_id.is_empty() {
        return Err(IdentityError::Empty);
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(IdentityError::TooLong(user_id.to_string()));
    }
    if user_id
        .chars()
        .any(|c| c == SEPARATOR || c.is_whitespace() || c.is_control())
    {
        return Err(IdentityError::Malformed(user_id.to_string()));
    }
    Ok(())
}

/// Canonical identifier for the unordered pair of users in a two-party chat.
///
/// Always `min_id + "_" + max_id`, so both participants derive the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Derive the chat id for two users. Commutative in its arguments.
    pub fn derive(user_a: &str, user_b: &str) -> Result<Self, IdentityError> {
        validate_user_id(user_a)?;
        validate_user_id(user_b)?;

        let (low, high) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        Ok(Self(format!("{low}{SEPARATOR}{high}")))
    }

    /// Validate a chat id supplied by a client.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let (a, b) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| IdentityError::NotAChatId(raw.to_string()))?;
        let derived =
            Self::derive(a, b).map_err(|_| IdentityError::NotAChatId(raw.to_string()))?;

        // Reject "u2_u1": only the canonical ordering names the chat.
        if derived.0 != raw {
            return Err(IdentityError::NotAChatId(raw.to_string()));
        }
        Ok(derived)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two participants, in sorted order.
    pub fn participants(&self) -> (&str, &str) {
        // Construction guarantees exactly one separator.
        self.0.split_once(SEPARATOR).unwrap_or((&self.0, &self.0))
    }

    pub fn includes(&self, user_id: &str) -> bool {
        let (a, b) = self.participants();
        a == user_id || b == user_id
    }

    /// The participant that is not `user_id`. For a self-chat that is the user
    /// themself.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        match self.participants() {
            (a, b) if a == user_id => Some(b),
            (a, b) if b == user_id => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ChatId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
