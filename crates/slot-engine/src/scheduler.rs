//! Create, edit and delete pipelines over a store.
//!
//! Every write path follows validate → expand → conflict-check → persist.
//! Validation errors are raised before anything is written. Conflicts are
//! returned as [`ScheduleOutcome::Rejected`], never as errors, and reject the
//! whole batch.
//!
//! Creation uses a compensating rollback rather than a transaction: the base
//! is written first, the batch is checked, and on any conflict (or storage
//! failure) everything written during the attempt is deleted again. Nothing
//! here takes a lock, so two concurrent creators can both pass the check and
//! double-book; the store's per-record consistency is all there is.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{diff_tracked_fields, AuditEntry, AuditSink, NullAuditSink};
use crate::config::EngineConfig;
use crate::conflict::{ConflictDetector, InstanceConflicts};
use crate::error::Result;
use crate::occurrence::{DurationHours, Occurrence, OccurrenceId, PersonId, ResourceKey};
use crate::recurrence;
use crate::series::SeriesManager;
use crate::store::OccurrenceStore;

/// How far an edit or delete reaches within a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    /// Only the addressed occurrence.
    #[default]
    ThisOnly,
    /// The addressed occurrence and every later member of its series.
    FutureAll,
}

impl fmt::Display for EditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditScope::ThisOnly => f.write_str("this_only"),
            EditScope::FutureAll => f.write_str("future_all"),
        }
    }
}

impl FromStr for EditScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "this_only" => Ok(EditScope::ThisOnly),
            "future_all" => Ok(EditScope::FutureAll),
            other => Err(format!("unknown scope '{other}'")),
        }
    }
}

/// New values for an edited occurrence.
///
/// Under [`EditScope::FutureAll`] the addressed occurrence takes `start`
/// verbatim; later members keep their own dates and take its time of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceEdit {
    pub resource: ResourceKey,
    pub start: DateTime<Utc>,
    pub duration: DurationHours,
    pub edited_by: Option<String>,
}

/// Result of a write attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// Everything was persisted; the occurrences as stored.
    Scheduled(Vec<Occurrence>),
    /// Nothing from this attempt was persisted.
    Rejected(Vec<InstanceConflicts>),
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled(_))
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        match self {
            ScheduleOutcome::Scheduled(occurrences) => occurrences,
            ScheduleOutcome::Rejected(_) => &[],
        }
    }

    pub fn conflicts(&self) -> &[InstanceConflicts] {
        match self {
            ScheduleOutcome::Scheduled(_) => &[],
            ScheduleOutcome::Rejected(conflicts) => conflicts,
        }
    }
}

/// Dry-run result: what would be written and what it would collide with.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub planned: Vec<Occurrence>,
    pub conflicts: Vec<InstanceConflicts>,
}

impl Preview {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

pub struct Scheduler<S, A = NullAuditSink> {
    store: S,
    audit: A,
    config: EngineConfig,
}

impl<S: OccurrenceStore> Scheduler<S, NullAuditSink> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_audit(store, NullAuditSink, config)
    }
}

impl<S: OccurrenceStore, A: AuditSink> Scheduler<S, A> {
    pub fn with_audit(store: S, audit: A, config: EngineConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detector(&self) -> ConflictDetector<'_, S> {
        ConflictDetector::new(&self.store)
    }

    pub fn series(&self) -> SeriesManager<'_, S> {
        SeriesManager::new(&self.store)
    }

    /// Validate and expand `base`, then report conflicts without writing.
    pub fn preview(&self, base: &Occurrence) -> Result<Preview> {
        base.validate(&self.config)?;
        let planned = recurrence::expand(base, &self.config)?;
        let conflicts = self.detector().check_batch(&planned, &HashSet::new())?;
        Ok(Preview { planned, conflicts })
    }

    /// Report what an edit would produce and collide with, without writing.
    ///
    /// A FutureAll preview excludes the affected sub-series from the check so
    /// its members are not reported against their own old positions.
    pub fn preview_edit(
        &self,
        id: OccurrenceId,
        edit: &OccurrenceEdit,
        scope: EditScope,
    ) -> Result<Preview> {
        let current = self.store.require(id)?;
        let series = self.series();

        let (planned, exclude_ids): (Vec<Occurrence>, HashSet<OccurrenceId>) =
            if scope == EditScope::FutureAll && series.is_in_series(&current)? {
                let future = series.future_members(&current, true)?;
                let exclude_ids = future.iter().map(|m| m.id).collect();
                let planned = future.iter().map(|m| apply_edit(m, id, edit)).collect();
                (planned, exclude_ids)
            } else {
                (vec![apply_edit(&current, id, edit)], HashSet::new())
            };

        for occurrence in &planned {
            occurrence.validate(&self.config)?;
        }
        let conflicts = self.detector().check_batch(&planned, &exclude_ids)?;
        Ok(Preview { planned, conflicts })
    }

    /// Create `base` and, if it recurs, its whole series.
    ///
    /// All-or-nothing: if any member conflicts, every row written during the
    /// attempt is deleted and the conflicts are returned.
    ///
    /// # Errors
    /// Validation errors are returned before any write. Storage errors are
    /// returned after the compensating rollback has been attempted.
    pub fn create(&self, base: Occurrence) -> Result<ScheduleOutcome> {
        base.validate(&self.config)?;
        let instances = recurrence::expand(&base, &self.config)?;

        let mut written = Vec::with_capacity(instances.len());
        self.store.insert(&base)?;
        written.push(base.id);

        let conflicts = match self.detector().check_batch(&instances, &HashSet::new()) {
            Ok(conflicts) => conflicts,
            Err(e) => {
                self.rollback(&written);
                return Err(e);
            }
        };
        if !conflicts.is_empty() {
            self.rollback(&written);
            tracing::warn!(
                base_id = %base.id,
                conflicted = conflicts.len(),
                planned = instances.len(),
                "series rejected: conflicts detected"
            );
            return Ok(ScheduleOutcome::Rejected(conflicts));
        }

        for instance in instances.iter().skip(1) {
            if let Err(e) = self.store.insert(instance) {
                self.rollback(&written);
                return Err(e);
            }
            written.push(instance.id);
        }

        tracing::info!(
            base_id = %base.id,
            person = %base.person,
            resource = %base.resource,
            count = instances.len(),
            "created occurrences"
        );
        Ok(ScheduleOutcome::Scheduled(instances))
    }

    /// Edit one occurrence, or it and the rest of its series.
    ///
    /// A FutureAll edit on a series member first splits the series at that
    /// member, so earlier history is untouched. The split is persisted even if
    /// the edit is then rejected for conflicts.
    pub fn edit(
        &self,
        id: OccurrenceId,
        edit: &OccurrenceEdit,
        scope: EditScope,
    ) -> Result<ScheduleOutcome> {
        let current = self.store.require(id)?;
        let series = self.series();

        if scope == EditScope::FutureAll && series.is_in_series(&current)? {
            let future = series.split_from(&current)?;
            let exclude_ids: HashSet<OccurrenceId> = future.iter().map(|m| m.id).collect();
            let edited: Vec<Occurrence> = future.iter().map(|m| apply_edit(m, id, edit)).collect();
            for occurrence in &edited {
                occurrence.validate(&self.config)?;
            }

            let conflicts = self.detector().check_batch(&edited, &exclude_ids)?;
            if !conflicts.is_empty() {
                tracing::warn!(
                    occurrence_id = %id,
                    conflicted = conflicts.len(),
                    "future edit rejected: conflicts detected"
                );
                return Ok(ScheduleOutcome::Rejected(conflicts));
            }

            for (before, after) in future.iter().zip(&edited) {
                self.store.update(after)?;
                self.record_changes(before, after, edit.edited_by.as_deref());
            }
            tracing::info!(occurrence_id = %id, count = edited.len(), "updated future occurrences");
            return Ok(ScheduleOutcome::Scheduled(edited));
        }

        let updated = apply_edit(&current, id, edit);
        updated.validate(&self.config)?;
        let report = self.detector().check(&updated, true, &HashSet::new())?;
        if !report.is_empty() {
            tracing::warn!(occurrence_id = %id, conflicts = report.len(), "edit rejected: conflicts detected");
            return Ok(ScheduleOutcome::Rejected(vec![InstanceConflicts {
                instance: updated,
                report,
            }]));
        }

        self.store.update(&updated)?;
        self.record_changes(&current, &updated, edit.edited_by.as_deref());
        tracing::info!(occurrence_id = %id, "updated occurrence");
        Ok(ScheduleOutcome::Scheduled(vec![updated]))
    }

    /// Delete one occurrence, or it and every later member of its series.
    ///
    /// Children of a deleted occurrence are detached (their parent reference
    /// cleared) rather than deleted. Returns how many records were removed.
    pub fn delete(&self, id: OccurrenceId, scope: EditScope) -> Result<usize> {
        let current = self.store.require(id)?;
        let series = self.series();

        let targets = if scope == EditScope::FutureAll && series.is_in_series(&current)? {
            series.future_members(&current, true)?
        } else {
            vec![current]
        };

        let deleted = self.remove_all(&targets)?;
        tracing::info!(occurrence_id = %id, %scope, deleted, "deleted occurrences");
        Ok(deleted)
    }

    /// Delete every occurrence of `person` starting at or after `from`.
    pub fn purge_person_from(&self, person: &PersonId, from: DateTime<Utc>) -> Result<usize> {
        let targets = self.store.person_starting_from(person, from)?;
        let deleted = self.remove_all(&targets)?;
        tracing::info!(%person, %from, deleted, "purged occurrences");
        Ok(deleted)
    }

    /// Delete `targets`, detaching any surviving children first. Returns how
    /// many records were actually removed.
    fn remove_all(&self, targets: &[Occurrence]) -> Result<usize> {
        let doomed: HashSet<OccurrenceId> = targets.iter().map(|t| t.id).collect();
        let mut deleted = 0;
        for target in targets {
            self.detach_children(target.id, &doomed)?;
            if self.store.delete(target.id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Clear the parent reference of `parent`'s children, skipping those in `skip`.
    fn detach_children(&self, parent: OccurrenceId, skip: &HashSet<OccurrenceId>) -> Result<()> {
        let now = Utc::now();
        for mut child in self.store.children_of(parent)? {
            if skip.contains(&child.id) {
                continue;
            }
            child.parent_id = None;
            child.updated_at = now;
            self.store.update(&child)?;
        }
        Ok(())
    }

    /// Best-effort removal of rows written during a failed attempt.
    fn rollback(&self, written: &[OccurrenceId]) {
        for id in written.iter().rev() {
            if let Err(e) = self.store.delete(*id) {
                tracing::warn!(occurrence_id = %id, error = %e, "rollback delete failed");
            }
        }
        tracing::debug!(count = written.len(), "rolled back written occurrences");
    }

    fn record_changes(&self, before: &Occurrence, after: &Occurrence, edited_by: Option<&str>) {
        let changes = diff_tracked_fields(before, after);
        if changes.is_empty() {
            return;
        }
        tracing::debug!(occurrence_id = %after.id, fields = changes.len(), "recording changes");
        self.audit.record(AuditEntry {
            occurrence_id: after.id,
            changed_by: edited_by.map(str::to_string),
            changes,
            recorded_at: Utc::now(),
        });
    }
}

/// `member` with the edit applied. The addressed occurrence takes the new
/// start verbatim; any other member keeps its date and takes the new time of day.
fn apply_edit(member: &Occurrence, addressed: OccurrenceId, edit: &OccurrenceEdit) -> Occurrence {
    let mut updated = member.clone();
    updated.resource = edit.resource.clone();
    updated.duration = edit.duration;
    updated.start = if member.id == addressed {
        edit.start
    } else {
        member.start.date_naive().and_time(edit.start.time()).and_utc()
    };
    updated.updated_at = Utc::now();
    updated
}
