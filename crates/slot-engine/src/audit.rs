//! Change tuples for persisted edits.
//!
//! Every successful edit is diffed field by field and the differences are
//! handed to an [`AuditSink`]. The person field is never part of the stream.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::occurrence::{Occurrence, OccurrenceId};

/// Fields whose changes are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Resource,
    StartTime,
    DurationHours,
    RecurrenceType,
    RecurrencePattern,
    RecurrenceEnd,
}

impl TrackedField {
    pub const ALL: [TrackedField; 6] = [
        TrackedField::Resource,
        TrackedField::StartTime,
        TrackedField::DurationHours,
        TrackedField::RecurrenceType,
        TrackedField::RecurrencePattern,
        TrackedField::RecurrenceEnd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrackedField::Resource => "resource",
            TrackedField::StartTime => "start_time",
            TrackedField::DurationHours => "duration_hours",
            TrackedField::RecurrenceType => "recurrence_type",
            TrackedField::RecurrencePattern => "recurrence_pattern",
            TrackedField::RecurrenceEnd => "recurrence_end",
        }
    }

    /// String form of this field on `occurrence`; empty when unset.
    fn read(&self, occurrence: &Occurrence) -> String {
        match self {
            TrackedField::Resource => occurrence.resource.to_string(),
            TrackedField::StartTime => occurrence.start.to_rfc3339(),
            TrackedField::DurationHours => occurrence.duration.as_hours().to_string(),
            TrackedField::RecurrenceType => occurrence.recurrence_type().to_string(),
            TrackedField::RecurrencePattern => occurrence
                .recurrence
                .as_ref()
                .and_then(|rule| serde_json::to_string(rule).ok())
                .unwrap_or_default(),
            TrackedField::RecurrenceEnd => occurrence
                .recurrence_end
                .map(|end| end.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

/// One `(field, old, new)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: TrackedField,
    pub old_value: String,
    pub new_value: String,
}

/// All tracked differences between two versions of an occurrence.
pub fn diff_tracked_fields(old: &Occurrence, new: &Occurrence) -> Vec<FieldChange> {
    TrackedField::ALL
        .iter()
        .filter_map(|field| {
            let old_value = field.read(old);
            let new_value = field.read(new);
            (old_value != new_value).then_some(FieldChange {
                field: *field,
                old_value,
                new_value,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub occurrence_id: OccurrenceId,
    pub changed_by: Option<String>,
    pub changes: Vec<FieldChange>,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for change tuples. Recording must not fail the edit.
pub trait AuditSink {
    fn record(&self, entry: AuditEntry);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

/// Keeps entries in memory, newest last.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries; a poisoned sink yields nothing and logs a warning.
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.read() {
            Ok(entries) => entries.clone(),
            Err(_) => {
                tracing::warn!("audit sink lock poisoned; returning no entries");
                Vec::new()
            }
        }
    }

    pub fn for_occurrence(&self, id: OccurrenceId) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.occurrence_id == id)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        match self.entries.write() {
            Ok(mut entries) => entries.push(entry),
            Err(_) => tracing::warn!(
                occurrence_id = %entry.occurrence_id,
                "audit sink lock poisoned; dropping entry"
            ),
        }
    }
}

impl<A: AuditSink + ?Sized> AuditSink for &A {
    fn record(&self, entry: AuditEntry) {
        (**self).record(entry);
    }
}
