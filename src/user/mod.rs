mod repository;
mod service;

#[cfg(test)]
pub(crate) mod memory;

pub use repository::*;
pub use service::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// User as saved on database.
///
/// Timestamps are already in their canonical string form, see
/// [`format_timestamp`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields of a user not yet persisted. Identity and timestamps come from the
/// store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Canonical timestamp form: RFC 3339, UTC, microseconds.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
