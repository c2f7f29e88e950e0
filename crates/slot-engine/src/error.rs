//! Error types for slot-engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::occurrence::OccurrenceId;

/// Errors raised before any write happens, plus storage failures.
///
/// Booking conflicts are deliberately absent: they are reported as values
/// (see [`crate::conflict::ConflictReport`]) so callers can show the details.
#[derive(Error, Debug)]
pub enum SlotError {
    /// Duration outside `[1, 16]` hours or not a multiple of half an hour.
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Type mismatch, missing or malformed fields, empty lists, bad weekdays.
    #[error("Invalid recurrence pattern: {0}")]
    InvalidRecurrencePattern(String),

    /// `recurrence_end` lies further than the configured cap after `start`.
    #[error("Recurrence span exceeded: {end} is more than {max_days} days after {start}")]
    RecurrenceSpanExceeded {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_days: i64,
    },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Occurrence not found: {0}")]
    NotFound(OccurrenceId),

    /// Failure reported by the storage collaborator. Always fatal.
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SlotError>;
