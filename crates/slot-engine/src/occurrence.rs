//! The booking data model: one concrete occurrence of a person on a resource.
//!
//! An [`Occurrence`] stores its start instant and a fixed-point duration; the
//! end instant is always derived. Series membership is a plain id back-reference
//! (`parent_id`) resolved through the store, never an embedded object.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, SlotError};
use crate::recurrence::{self, RecurrenceRule};

/// Opaque unique identifier of an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceId(Uuid);

impl OccurrenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OccurrenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OccurrenceId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the person being booked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three-segment identity of a physical booking slot: base, venue, seat.
///
/// Ordering of the segments is significant; two keys are the same resource
/// only when all three segments match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub base: String,
    pub venue: String,
    pub seat: String,
}

impl ResourceKey {
    pub fn new(base: impl Into<String>, venue: impl Into<String>, seat: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            venue: venue.into(),
            seat: seat.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.base, self.venue, self.seat)
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(venue), Some(seat), None)
                if !base.is_empty() && !venue.is_empty() && !seat.is_empty() =>
            {
                Ok(Self::new(base, venue, seat))
            }
            _ => Err(format!("expected 'base/venue/seat', got '{s}'")),
        }
    }
}

/// Booking length in half-hour units, constrained to 1.0..=16.0 hours.
///
/// Serialized as a floating-point number of hours (`6.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct DurationHours(u8);

impl DurationHours {
    pub const MIN_HALF_HOURS: u8 = 2;
    pub const MAX_HALF_HOURS: u8 = 32;

    /// Build a duration from hours, rejecting values outside `[1, 16]` or
    /// not on a half-hour step.
    pub fn from_hours(hours: f64) -> Result<Self> {
        if !hours.is_finite() {
            return Err(SlotError::InvalidDuration(format!("{hours} is not a number of hours")));
        }
        if !(1.0..=16.0).contains(&hours) {
            return Err(SlotError::InvalidDuration(format!(
                "{hours}h is outside the 1-16 hour range"
            )));
        }
        let halves = hours * 2.0;
        if halves.fract() != 0.0 {
            return Err(SlotError::InvalidDuration(format!(
                "{hours}h is not a multiple of 0.5 hours"
            )));
        }
        Ok(Self(halves as u8))
    }

    pub fn half_hours(&self) -> u8 {
        self.0
    }

    pub fn as_hours(&self) -> f64 {
        f64::from(self.0) / 2.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.0) * 30)
    }
}

impl TryFrom<f64> for DurationHours {
    type Error = SlotError;

    fn try_from(hours: f64) -> Result<Self> {
        Self::from_hours(hours)
    }
}

impl From<DurationHours> for f64 {
    fn from(d: DurationHours) -> f64 {
        d.as_hours()
    }
}

impl fmt::Display for DurationHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}h", self.0 / 2)
        } else {
            write!(f, "{}h", self.as_hours())
        }
    }
}

/// The recurrence kind of an occurrence. Children of a series are always `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    #[default]
    None,
    Daily,
    Weekly,
    Custom,
}

impl RecurrenceType {
    /// The lowercase tag a pattern payload must carry in its `type` field.
    pub fn pattern_tag(&self) -> &'static str {
        match self {
            RecurrenceType::None => "none",
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Custom => "custom",
        }
    }
}

impl fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecurrenceType::None => "NONE",
            RecurrenceType::Daily => "DAILY",
            RecurrenceType::Weekly => "WEEKLY",
            RecurrenceType::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

impl FromStr for RecurrenceType {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "NONE" => Ok(RecurrenceType::None),
            "DAILY" => Ok(RecurrenceType::Daily),
            "WEEKLY" => Ok(RecurrenceType::Weekly),
            "CUSTOM" => Ok(RecurrenceType::Custom),
            other => Err(SlotError::InvalidRecurrencePattern(format!(
                "unknown recurrence type '{other}'"
            ))),
        }
    }
}

/// A single scheduled booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub resource: ResourceKey,
    pub person: PersonId,
    /// Start instant, always UTC.
    pub start: DateTime<Utc>,
    pub duration: DurationHours,
    /// Live recurrence rule; only a series root carries one.
    pub recurrence: Option<RecurrenceRule>,
    pub recurrence_end: Option<DateTime<Utc>>,
    /// Series root this occurrence was generated from.
    pub parent_id: Option<OccurrenceId>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Occurrence {
    /// A fresh, non-recurring occurrence with a newly minted id.
    pub fn new(
        resource: ResourceKey,
        person: PersonId,
        start: DateTime<Utc>,
        duration: DurationHours,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OccurrenceId::new(),
            resource,
            person,
            start,
            duration,
            recurrence: None,
            recurrence_end: None,
            parent_id: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule, end: Option<DateTime<Utc>>) -> Self {
        self.recurrence = Some(rule);
        self.recurrence_end = end;
        self
    }

    pub fn with_created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    /// Derived end instant: `start + duration`.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration.as_duration()
    }

    pub fn recurrence_type(&self) -> RecurrenceType {
        self.recurrence
            .as_ref()
            .map_or(RecurrenceType::None, RecurrenceRule::recurrence_type)
    }

    pub fn is_series_child(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Check the invariants that must hold before the occurrence is persisted.
    ///
    /// Duration is enforced by [`DurationHours`] itself; this re-checks the
    /// rule shape (variants can be built directly), rejects a rule on a series
    /// child, and applies the span cap.
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        if let Some(rule) = &self.recurrence {
            // Membership is flat: a child never roots a series of its own.
            if let Some(parent_id) = self.parent_id {
                return Err(SlotError::InvalidRecurrencePattern(format!(
                    "occurrence {} belongs to series {parent_id} and cannot carry a {} rule",
                    self.id,
                    rule.recurrence_type()
                )));
            }
            rule.validate()?;
        }
        if let Some(end) = self.recurrence_end {
            recurrence::validate_span(self.start, end, config.max_span_days)?;
        }
        Ok(())
    }

    /// Copy of `self` as a generated series member starting at `start`.
    pub(crate) fn spawn_child(&self, start: DateTime<Utc>) -> Self {
        Self {
            id: OccurrenceId::new(),
            resource: self.resource.clone(),
            person: self.person.clone(),
            start,
            duration: self.duration,
            recurrence: None,
            recurrence_end: None,
            parent_id: Some(self.id),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
