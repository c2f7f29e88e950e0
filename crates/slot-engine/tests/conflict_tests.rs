//! Tests for double-booking detection.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use slot_engine::conflict::{find_conflicts, overlap};
use slot_engine::{
    ConflictDetector, DurationHours, MemoryStore, Occurrence, OccurrenceStore, PersonId,
    ResourceKey,
};

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 15, hour, min, 0).unwrap()
}

fn booking(resource: &str, person: &str, start: DateTime<Utc>, hours: f64) -> Occurrence {
    Occurrence::new(
        resource.parse::<ResourceKey>().unwrap(),
        PersonId::new(person),
        start,
        DurationHours::from_hours(hours).unwrap(),
    )
}

fn store_with(existing: &[&Occurrence]) -> MemoryStore {
    let store = MemoryStore::new();
    for occurrence in existing {
        store.insert(occurrence).unwrap();
    }
    store
}

fn none() -> HashSet<slot_engine::OccurrenceId> {
    HashSet::new()
}

// ---------------------------------------------------------------------------
// overlap()
// ---------------------------------------------------------------------------

#[test]
fn overlap_is_intersection_of_windows() {
    assert_eq!(overlap(at(10, 0), at(12, 0), at(11, 0), at(13, 0)), Some((at(11, 0), at(12, 0))));
    assert_eq!(overlap(at(10, 0), at(16, 0), at(11, 0), at(12, 0)), Some((at(11, 0), at(12, 0))));
}

#[test]
fn touching_windows_do_not_overlap() {
    assert_eq!(overlap(at(10, 0), at(12, 0), at(12, 0), at(14, 0)), None);
    assert_eq!(overlap(at(12, 0), at(14, 0), at(10, 0), at(12, 0)), None);
}

// ---------------------------------------------------------------------------
// ConflictDetector::check
// ---------------------------------------------------------------------------

#[test]
fn same_resource_overlap_is_a_resource_conflict() {
    let existing = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let store = store_with(&[&existing]);
    let candidate = booking("north/studio-a/1", "p2", at(11, 0), 2.0);

    let report = ConflictDetector::new(&store)
        .check(&candidate, true, &none())
        .unwrap();

    assert_eq!(report.resource_conflicts.len(), 1);
    assert!(report.person_conflicts.is_empty());
    let conflict = &report.resource_conflicts[0];
    assert_eq!(conflict.other.id, existing.id);
    assert_eq!(conflict.overlap_start, at(11, 0));
    assert_eq!(conflict.overlap_end, at(12, 0));
    assert_eq!(conflict.overlap_minutes(), 60);
}

#[test]
fn adjacent_booking_is_not_a_conflict() {
    let existing = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let store = store_with(&[&existing]);
    let candidate = booking("north/studio-a/1", "p1", at(12, 0), 2.0);

    let report = ConflictDetector::new(&store)
        .check(&candidate, true, &none())
        .unwrap();
    assert!(report.is_empty());
}

#[test]
fn same_person_on_other_resource_is_a_person_conflict() {
    let existing = booking("north/studio-a/1", "p1", at(10, 0), 3.0);
    let store = store_with(&[&existing]);
    let candidate = booking("south/studio-b/2", "p1", at(12, 30), 1.0);

    let report = ConflictDetector::new(&store)
        .check(&candidate, true, &none())
        .unwrap();

    assert!(report.resource_conflicts.is_empty());
    assert_eq!(report.person_conflicts.len(), 1);
    assert_eq!(report.person_conflicts[0].overlap_start, at(12, 30));
    assert_eq!(report.person_conflicts[0].overlap_end, at(13, 0));
}

#[test]
fn same_resource_and_person_is_reported_in_both_lists() {
    let existing = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let store = store_with(&[&existing]);
    let candidate = booking("north/studio-a/1", "p1", at(9, 0), 1.5);

    let report = ConflictDetector::new(&store)
        .check(&candidate, true, &none())
        .unwrap();

    assert_eq!(report.resource_conflicts.len(), 1);
    assert_eq!(report.person_conflicts.len(), 1);
    assert_eq!(report.len(), 2);
    assert_eq!(report.resource_conflicts[0].other.id, report.person_conflicts[0].other.id);
}

#[test]
fn unrelated_bookings_do_not_conflict() {
    let existing = booking("north/studio-a/1", "p1", at(10, 0), 6.0);
    let store = store_with(&[&existing]);
    let candidate = booking("north/studio-a/2", "p2", at(10, 0), 6.0);

    let report = ConflictDetector::new(&store)
        .check(&candidate, true, &none())
        .unwrap();
    assert!(report.is_empty());
}

#[test]
fn booking_starting_after_candidate_ends_is_ignored() {
    let later = booking("north/studio-a/1", "p1", at(14, 0), 2.0);
    let store = store_with(&[&later]);
    let candidate = booking("north/studio-a/1", "p1", at(10, 0), 4.0);

    let report = ConflictDetector::new(&store)
        .check(&candidate, true, &none())
        .unwrap();
    assert!(report.is_empty());
}

#[test]
fn exclude_self_skips_the_stored_copy_of_candidate() {
    let stored = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let store = store_with(&[&stored]);
    let detector = ConflictDetector::new(&store);

    let mut moved = stored.clone();
    moved.start = at(11, 0);

    assert!(detector.check(&moved, true, &none()).unwrap().is_empty());

    let report = detector.check(&moved, false, &none()).unwrap();
    assert_eq!(report.resource_conflicts.len(), 1);
    assert_eq!(report.person_conflicts.len(), 1);
}

#[test]
fn exclude_ids_are_ignored() {
    let a = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let b = booking("north/studio-a/1", "p2", at(10, 30), 2.0);
    let store = store_with(&[&a, &b]);
    let candidate = booking("north/studio-a/1", "p3", at(11, 0), 1.0);
    let detector = ConflictDetector::new(&store);

    assert_eq!(detector.check(&candidate, true, &none()).unwrap().resource_conflicts.len(), 2);

    let exclude: HashSet<_> = [a.id].into_iter().collect();
    let report = detector.check(&candidate, true, &exclude).unwrap();
    assert_eq!(report.resource_conflicts.len(), 1);
    assert_eq!(report.resource_conflicts[0].other.id, b.id);
}

#[test]
fn find_conflicts_works_on_plain_slices() {
    let a = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let b = booking("north/studio-a/9", "p9", at(10, 0), 2.0);
    let candidate = booking("north/studio-a/1", "p2", at(11, 30), 1.0);

    let report = find_conflicts(&candidate, [&a, &b], true, &none());
    assert_eq!(report.resource_conflicts.len(), 1);
    assert_eq!(report.resource_conflicts[0].overlap_minutes(), 30);
    assert!(report.person_conflicts.is_empty());
}

// ---------------------------------------------------------------------------
// ConflictDetector::check_batch
// ---------------------------------------------------------------------------

#[test]
fn batch_reports_only_conflicted_members() {
    let existing = booking("north/studio-a/1", "p1", at(12, 0), 2.0);
    let store = store_with(&[&existing]);

    let clean = booking("north/studio-a/1", "p2", at(8, 0), 2.0);
    let clashing = booking("north/studio-a/1", "p2", at(13, 0), 2.0);
    let also_clean = booking("north/studio-a/1", "p2", at(14, 0), 2.0);

    let conflicts = ConflictDetector::new(&store)
        .check_batch(&[clean, clashing.clone(), also_clean], &none())
        .unwrap();

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].instance.id, clashing.id);
    assert_eq!(conflicts[0].report.resource_conflicts[0].other.id, existing.id);
}

#[test]
fn batch_members_are_not_checked_against_each_other() {
    let store = MemoryStore::new();
    let first = booking("north/studio-a/1", "p1", at(10, 0), 2.0);
    let second = booking("north/studio-a/1", "p1", at(11, 0), 2.0);

    let conflicts = ConflictDetector::new(&store)
        .check_batch(&[first, second], &none())
        .unwrap();
    assert!(conflicts.is_empty(), "only persisted records are consulted");
}
