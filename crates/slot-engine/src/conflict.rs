//! Double-booking detection against persisted occurrences.
//!
//! An occurrence occupies `[start, start + duration)`. Two occurrences conflict
//! when those windows overlap by a strictly positive amount and they share
//! either the resource key or the person. Adjacent windows (one ends exactly
//! when the other starts) are NOT conflicts.
//!
//! Checks read the store without any lock: two callers booking the same slot
//! at the same moment can both see a clean report before either writes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::occurrence::{Occurrence, OccurrenceId};
use crate::store::{OccurrenceStore, StartFilter};

/// One existing occurrence that overlaps the candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub other: Occurrence,
    pub overlap_start: DateTime<Utc>,
    pub overlap_end: DateTime<Utc>,
}

impl Conflict {
    pub fn overlap_minutes(&self) -> i64 {
        (self.overlap_end - self.overlap_start).num_minutes()
    }
}

/// Conflicts for one candidate, split by the key they collide on.
///
/// The same `other` may appear in both lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictReport {
    pub resource_conflicts: Vec<Conflict>,
    pub person_conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.resource_conflicts.is_empty() && self.person_conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resource_conflicts.len() + self.person_conflicts.len()
    }
}

/// A member of a batch together with what it collided with.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConflicts {
    pub instance: Occurrence,
    pub report: ConflictReport,
}

/// Strict overlap of two half-open windows, as `(max(starts), min(ends))`.
pub fn overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if b_start < a_end && b_end > a_start {
        Some((a_start.max(b_start), a_end.min(b_end)))
    } else {
        None
    }
}

/// Classify `existing` occurrences against `candidate` without touching storage.
///
/// Occurrences listed in `exclude_ids`, and the candidate itself when
/// `exclude_self` is set, are ignored.
pub fn find_conflicts<'a>(
    candidate: &Occurrence,
    existing: impl IntoIterator<Item = &'a Occurrence>,
    exclude_self: bool,
    exclude_ids: &HashSet<OccurrenceId>,
) -> ConflictReport {
    let start = candidate.start;
    let end = candidate.end();
    let mut report = ConflictReport::default();

    for other in existing {
        if exclude_ids.contains(&other.id) || (exclude_self && other.id == candidate.id) {
            continue;
        }
        let Some((overlap_start, overlap_end)) = overlap(start, end, other.start, other.end())
        else {
            continue;
        };
        if other.resource == candidate.resource {
            report.resource_conflicts.push(Conflict {
                other: other.clone(),
                overlap_start,
                overlap_end,
            });
        }
        if other.person == candidate.person {
            report.person_conflicts.push(Conflict {
                other: other.clone(),
                overlap_start,
                overlap_end,
            });
        }
    }

    report
}

/// Checks candidates against whatever the store currently holds.
pub struct ConflictDetector<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: OccurrenceStore + ?Sized> ConflictDetector<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Find every persisted occurrence overlapping `candidate` on its resource
    /// or its person.
    ///
    /// Only `start < candidate.end` is pushed to the store (once per key); the
    /// end-side comparison happens here because end times are derived.
    pub fn check(
        &self,
        candidate: &Occurrence,
        exclude_self: bool,
        exclude_ids: &HashSet<OccurrenceId>,
    ) -> Result<ConflictReport> {
        let end = candidate.end();
        let same_resource = self
            .store
            .starting_before(end, StartFilter::Resource(&candidate.resource))?;
        let same_person = self
            .store
            .starting_before(end, StartFilter::Person(&candidate.person))?;

        let resource_conflicts =
            find_conflicts(candidate, &same_resource, exclude_self, exclude_ids).resource_conflicts;
        let person_conflicts =
            find_conflicts(candidate, &same_person, exclude_self, exclude_ids).person_conflicts;

        Ok(ConflictReport {
            resource_conflicts,
            person_conflicts,
        })
    }

    /// Check every member of a batch independently.
    ///
    /// Returns only the members that collided; an empty result means the
    /// whole batch may be written. Each member excludes itself.
    pub fn check_batch(
        &self,
        instances: &[Occurrence],
        exclude_ids: &HashSet<OccurrenceId>,
    ) -> Result<Vec<InstanceConflicts>> {
        let mut conflicted = Vec::new();
        for instance in instances {
            let report = self.check(instance, true, exclude_ids)?;
            if !report.is_empty() {
                tracing::debug!(
                    start = %instance.start,
                    resource = %instance.resource,
                    conflicts = report.len(),
                    "batch member conflicts"
                );
                conflicted.push(InstanceConflicts {
                    instance: instance.clone(),
                    report,
                });
            }
        }
        Ok(conflicted)
    }
}
