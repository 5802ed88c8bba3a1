//! # Shared chat types and constants
//!
//! Helpers around the generated [`ChatMessage`] so that the server and any
//! client agree on how system messages and timestamps look.
//!
//! - [`SYSTEM_SENDER`] - Sender name used for server-authored announcements.
//! - [`unix_timestamp`] - Current time as Unix epoch seconds, the unit of
//!   [`ChatMessage::timestamp`].

use crate::proto::ChatMessage;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sender name carried by messages the server authors itself.
pub const SYSTEM_SENDER: &str = "System";

/// Current wall-clock time in Unix epoch seconds.
///
/// Returns `0` if the system clock is set before the epoch.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

impl ChatMessage {
    /// A message authored by the server, stamped with the current time.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            username: SYSTEM_SENDER.to_string(),
            content: content.into(),
            timestamp: unix_timestamp(),
        }
    }

    /// The announcement broadcast when `username` enters the room.
    pub fn join_announcement(username: &str) -> Self {
        Self::system(format!("{username} joined"))
    }

    /// Replaces the timestamp, discarding whatever the client supplied.
    #[must_use]
    pub fn stamped(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether the message was authored by the server.
    pub fn is_system(&self) -> bool {
        self.username == SYSTEM_SENDER
    }
}
