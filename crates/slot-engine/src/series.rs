//! Parent/child topology of recurring series.
//!
//! A series is a root plus every occurrence whose `parent_id` names that root;
//! membership is flat. Members are always resolved through the store by id.
//! When an occurrence cannot be found inside the series it claims, operations
//! fall back to treating it as a singleton instead of failing.

use chrono::Utc;

use crate::error::Result;
use crate::occurrence::{Occurrence, RecurrenceType};
use crate::store::OccurrenceStore;

pub struct SeriesManager<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: OccurrenceStore + ?Sized> SeriesManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The root of `occurrence`'s series, or `None` if its parent is gone.
    pub fn root_of(&self, occurrence: &Occurrence) -> Result<Option<Occurrence>> {
        match occurrence.parent_id {
            None => Ok(Some(
                self.store
                    .get(occurrence.id)?
                    .unwrap_or_else(|| occurrence.clone()),
            )),
            Some(parent_id) => self.store.get(parent_id),
        }
    }

    /// Root plus children, ascending by start time.
    pub fn series_members(&self, occurrence: &Occurrence) -> Result<Vec<Occurrence>> {
        let Some(root) = self.root_of(occurrence)? else {
            tracing::warn!(
                occurrence_id = %occurrence.id,
                parent_id = ?occurrence.parent_id,
                "series root missing; treating occurrence as a singleton"
            );
            return Ok(vec![occurrence.clone()]);
        };

        let mut members = self.store.children_of(root.id)?;
        members.insert(0, root);
        members.sort_by_key(|m| m.start);
        Ok(members)
    }

    /// The part of the series from `occurrence` onwards.
    pub fn future_members(
        &self,
        occurrence: &Occurrence,
        include_self: bool,
    ) -> Result<Vec<Occurrence>> {
        let mut members = self.series_members(occurrence)?;
        let Some(index) = members.iter().position(|m| m.id == occurrence.id) else {
            tracing::warn!(
                occurrence_id = %occurrence.id,
                "occurrence not found in its own series; degrading to singleton"
            );
            return Ok(if include_self {
                vec![occurrence.clone()]
            } else {
                Vec::new()
            });
        };

        let from = if include_self { index } else { index + 1 };
        Ok(members.split_off(from))
    }

    /// Detach the series from `occurrence` onwards into a new, independent series.
    ///
    /// The first future member becomes the new root and takes over the old
    /// root's rule and end verbatim; later members are repointed at it. Members
    /// before `occurrence` stay under the old root. Returns the new series.
    pub fn split_from(&self, occurrence: &Occurrence) -> Result<Vec<Occurrence>> {
        let mut future = self.future_members(occurrence, true)?;
        if future.len() <= 1 {
            return Ok(future);
        }

        let original_root = self
            .root_of(occurrence)?
            .unwrap_or_else(|| occurrence.clone());
        let now = Utc::now();

        let new_root_id = future[0].id;
        for (i, member) in future.iter_mut().enumerate() {
            if i == 0 {
                member.parent_id = None;
                member.recurrence = original_root.recurrence.clone();
                member.recurrence_end = original_root
                    .recurrence
                    .as_ref()
                    .and(original_root.recurrence_end);
            } else {
                member.parent_id = Some(new_root_id);
            }
            member.updated_at = now;
            self.store.update(member)?;
        }

        tracing::info!(
            old_root = %original_root.id,
            new_root = %new_root_id,
            moved = future.len(),
            "split series"
        );
        Ok(future)
    }

    /// Whether `occurrence` belongs to a series: it is a child, or it is a
    /// recurring root that actually has children.
    pub fn is_in_series(&self, occurrence: &Occurrence) -> Result<bool> {
        if occurrence.parent_id.is_some() {
            return Ok(true);
        }
        if occurrence.recurrence_type() == RecurrenceType::None {
            return Ok(false);
        }
        Ok(self.store.count_children(occurrence.id)? > 0)
    }
}
