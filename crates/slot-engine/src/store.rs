//! The storage collaborator the core runs against.
//!
//! [`OccurrenceStore`] is the whole contract: CRUD by id, a `start < X`
//! prefilter (optionally narrowed to one resource or one person) and a
//! children-of-parent query. Only `start` can be pushed down; overlap on the
//! derived end time is computed by the caller.
//!
//! [`MemoryStore`] is an insertion-ordered in-process implementation.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{Result, SlotError};
use crate::occurrence::{Occurrence, OccurrenceId, PersonId, ResourceKey};

/// Narrowing applied to the `start < X` prefilter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFilter<'a> {
    All,
    Resource(&'a ResourceKey),
    Person(&'a PersonId),
}

impl StartFilter<'_> {
    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        match self {
            StartFilter::All => true,
            StartFilter::Resource(key) => occurrence.resource == **key,
            StartFilter::Person(person) => occurrence.person == **person,
        }
    }
}

/// Persistence operations the core needs. All calls are synchronous and
/// every failure is surfaced as `SlotError::Storage` (or `NotFound`).
pub trait OccurrenceStore {
    /// Persist a new record.
    fn insert(&self, occurrence: &Occurrence) -> Result<()>;

    /// Replace an existing record.
    fn update(&self, occurrence: &Occurrence) -> Result<()>;

    fn get(&self, id: OccurrenceId) -> Result<Option<Occurrence>>;

    /// Remove a record; returns whether it existed.
    fn delete(&self, id: OccurrenceId) -> Result<bool>;

    /// Records with `start < before` matching `filter`.
    fn starting_before(&self, before: DateTime<Utc>, filter: StartFilter<'_>)
        -> Result<Vec<Occurrence>>;

    /// Records whose `parent_id` is `parent`.
    fn children_of(&self, parent: OccurrenceId) -> Result<Vec<Occurrence>>;

    fn count_children(&self, parent: OccurrenceId) -> Result<usize> {
        Ok(self.children_of(parent)?.len())
    }

    /// A person's records with `start >= from`.
    fn person_starting_from(
        &self,
        person: &PersonId,
        from: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>>;

    /// Fetch a record that must exist.
    fn require(&self, id: OccurrenceId) -> Result<Occurrence> {
        self.get(id)?.ok_or(SlotError::NotFound(id))
    }
}

/// In-memory store keeping records in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<IndexMap<OccurrenceId, Occurrence>>,
}

fn poisoned<T>(_: PoisonError<T>) -> SlotError {
    SlotError::Storage("occurrence store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records; a poisoned store reports zero and logs a warning.
    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(records) => records.len(),
            Err(_) => {
                tracing::warn!("occurrence store lock poisoned; reporting zero records");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record, in insertion order.
    pub fn all(&self) -> Result<Vec<Occurrence>> {
        Ok(self.records.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn select(&self, predicate: impl Fn(&Occurrence) -> bool) -> Result<Vec<Occurrence>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.values().filter(|o| predicate(o)).cloned().collect())
    }
}

impl OccurrenceStore for MemoryStore {
    fn insert(&self, occurrence: &Occurrence) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&occurrence.id) {
            return Err(SlotError::Storage(format!(
                "duplicate occurrence id {}",
                occurrence.id
            )));
        }
        records.insert(occurrence.id, occurrence.clone());
        Ok(())
    }

    fn update(&self, occurrence: &Occurrence) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.get_mut(&occurrence.id) {
            Some(slot) => {
                *slot = occurrence.clone();
                Ok(())
            }
            None => Err(SlotError::NotFound(occurrence.id)),
        }
    }

    fn get(&self, id: OccurrenceId) -> Result<Option<Occurrence>> {
        Ok(self.records.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn delete(&self, id: OccurrenceId) -> Result<bool> {
        Ok(self
            .records
            .write()
            .map_err(poisoned)?
            .shift_remove(&id)
            .is_some())
    }

    fn starting_before(
        &self,
        before: DateTime<Utc>,
        filter: StartFilter<'_>,
    ) -> Result<Vec<Occurrence>> {
        self.select(|o| o.start < before && filter.matches(o))
    }

    fn children_of(&self, parent: OccurrenceId) -> Result<Vec<Occurrence>> {
        self.select(|o| o.parent_id == Some(parent))
    }

    fn person_starting_from(
        &self,
        person: &PersonId,
        from: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>> {
        self.select(|o| o.person == *person && o.start >= from)
    }
}

impl<S: OccurrenceStore + ?Sized> OccurrenceStore for &S {
    fn insert(&self, occurrence: &Occurrence) -> Result<()> {
        (**self).insert(occurrence)
    }

    fn update(&self, occurrence: &Occurrence) -> Result<()> {
        (**self).update(occurrence)
    }

    fn get(&self, id: OccurrenceId) -> Result<Option<Occurrence>> {
        (**self).get(id)
    }

    fn delete(&self, id: OccurrenceId) -> Result<bool> {
        (**self).delete(id)
    }

    fn starting_before(
        &self,
        before: DateTime<Utc>,
        filter: StartFilter<'_>,
    ) -> Result<Vec<Occurrence>> {
        (**self).starting_before(before, filter)
    }

    fn children_of(&self, parent: OccurrenceId) -> Result<Vec<Occurrence>> {
        (**self).children_of(parent)
    }

    fn count_children(&self, parent: OccurrenceId) -> Result<usize> {
        (**self).count_children(parent)
    }

    fn person_starting_from(
        &self,
        person: &PersonId,
        from: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>> {
        (**self).person_starting_from(person, from)
    }
}
