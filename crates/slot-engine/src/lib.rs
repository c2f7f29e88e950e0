//! # slot-engine
//!
//! Booking core for recurring broadcast slots: a person on a physical resource
//! for a time window, with no double-booking of either.
//!
//! The engine expands a daily, weekly or custom recurrence rule into a bounded
//! series of concrete occurrences, checks each one for overlap against the
//! resource and the person independently, and manages the root/child topology
//! of a series so an edit or delete can reach "this occurrence" or "this and
//! all future occurrences" without disturbing history.
//!
//! ## Quick start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use slot_engine::{
//!     DurationHours, EngineConfig, MemoryStore, Occurrence, PersonId, RecurrenceRule,
//!     ResourceKey, Scheduler,
//! };
//!
//! let scheduler = Scheduler::new(MemoryStore::new(), EngineConfig::default());
//! let base = Occurrence::new(
//!     ResourceKey::new("north", "studio-a", "3"),
//!     PersonId::new("host-17"),
//!     Utc.with_ymd_and_hms(2025, 9, 15, 10, 0, 0).unwrap(),
//!     DurationHours::from_hours(6.0).unwrap(),
//! )
//! .with_recurrence(
//!     RecurrenceRule::weekly(1, [1, 2, 3, 4, 5]).unwrap(),
//!     Some(Utc.with_ymd_and_hms(2025, 9, 19, 23, 59, 0).unwrap()),
//! );
//!
//! let outcome = scheduler.create(base).unwrap();
//! assert_eq!(outcome.occurrences().len(), 5);
//! ```
//!
//! ## Modules
//!
//! - [`occurrence`] — the booking record, ids, resource keys, fixed-point durations
//! - [`recurrence`] — rule validation and expansion
//! - [`conflict`] — overlap detection on resource and person
//! - [`series`] — series membership, future slices, splitting
//! - [`store`] — the storage collaborator trait and an in-memory store
//! - [`scheduler`] — create / edit / delete pipelines with batch rejection
//! - [`audit`] — field-change tuples and sinks
//! - [`timezone`] — local wall-clock input to UTC
//! - [`config`] — limits and local zone
//! - [`error`] — Error types

pub mod audit;
pub mod config;
pub mod conflict;
pub mod error;
pub mod occurrence;
pub mod recurrence;
pub mod scheduler;
pub mod series;
pub mod store;
pub mod timezone;

pub use audit::{AuditSink, FieldChange, MemoryAuditSink, NullAuditSink, TrackedField};
pub use config::EngineConfig;
pub use conflict::{Conflict, ConflictDetector, ConflictReport, InstanceConflicts};
pub use error::SlotError;
pub use occurrence::{
    DurationHours, Occurrence, OccurrenceId, PersonId, RecurrenceType, ResourceKey,
};
pub use recurrence::{expand, RecurrenceRule};
pub use scheduler::{EditScope, OccurrenceEdit, Preview, ScheduleOutcome, Scheduler};
pub use series::SeriesManager;
pub use store::{MemoryStore, OccurrenceStore, StartFilter};
