//! Recurrence rules and their expansion into concrete occurrences.
//!
//! A rule is a tagged union ([`RecurrenceRule`]) so the shape of each kind is
//! checked once, at construction or when a loose JSON payload is parsed. The
//! expander then turns a base occurrence into `[base, child, child, ...]`,
//! bounded by the configured instance cap and horizon.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{Result, SlotError};
use crate::occurrence::{Occurrence, RecurrenceType};

/// A validated recurrence rule.
///
/// Serializes with a lowercase `type` tag, e.g.
/// `{"type":"weekly","interval":1,"days_of_week":[1,3]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecurrenceRule {
    /// Every `interval` days.
    Daily { interval: u32 },
    /// The listed ISO weekdays (1=Monday..7=Sunday) of every `interval`-th week.
    Weekly { interval: u32, days_of_week: Vec<u8> },
    /// Explicit start instants, kept as given. Unparseable entries are
    /// skipped at expansion time rather than rejected here.
    Custom { specific_dates: Vec<String> },
}

impl RecurrenceRule {
    pub fn daily(interval: u32) -> Result<Self> {
        let rule = RecurrenceRule::Daily { interval };
        rule.validate()?;
        Ok(rule)
    }

    /// Weekly rule; weekdays are sorted and de-duplicated.
    pub fn weekly(interval: u32, days_of_week: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut days: Vec<u8> = days_of_week.into_iter().collect();
        days.sort_unstable();
        days.dedup();
        let rule = RecurrenceRule::Weekly {
            interval,
            days_of_week: days,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn custom<I, S>(dates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rule = RecurrenceRule::Custom {
            specific_dates: dates.into_iter().map(Into::into).collect(),
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Parse an untyped pattern payload for the given recurrence type.
    ///
    /// # Errors
    /// Returns `SlotError::InvalidRecurrencePattern` when the payload is not an
    /// object, its `type` tag does not match `recurrence_type`, or any field is
    /// missing or out of range.
    pub fn parse(recurrence_type: RecurrenceType, pattern: &Value) -> Result<Self> {
        let obj = pattern
            .as_object()
            .ok_or_else(|| invalid("pattern must be a JSON object"))?;

        let tag = obj.get("type").and_then(Value::as_str);
        if tag != Some(recurrence_type.pattern_tag()) {
            return Err(invalid(format!(
                "pattern type {:?} does not match recurrence type {}",
                tag.unwrap_or("<missing>"),
                recurrence_type
            )));
        }

        match recurrence_type {
            RecurrenceType::None => Err(invalid("a non-recurring occurrence has no pattern")),
            RecurrenceType::Daily => Self::daily(read_interval(obj.get("interval"), "daily")?),
            RecurrenceType::Weekly => {
                let interval = read_interval(obj.get("interval"), "weekly")?;
                let days = obj
                    .get("days_of_week")
                    .and_then(Value::as_array)
                    .filter(|days| !days.is_empty())
                    .ok_or_else(|| invalid("weekly recurrence needs a non-empty days_of_week"))?;
                let days = days
                    .iter()
                    .map(|d| {
                        d.as_u64()
                            .filter(|n| (1..=7).contains(n))
                            .map(|n| n as u8)
                            .ok_or_else(|| invalid(format!("weekday {d} is not an integer in 1..=7")))
                    })
                    .collect::<Result<Vec<u8>>>()?;
                Self::weekly(interval, days)
            }
            RecurrenceType::Custom => {
                let dates = obj
                    .get("specific_dates")
                    .and_then(Value::as_array)
                    .filter(|dates| !dates.is_empty())
                    .ok_or_else(|| invalid("custom recurrence needs a non-empty specific_dates"))?;
                Self::custom(dates.iter().map(|d| match d {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }))
            }
        }
    }

    /// Re-check the shape of a rule that may have been built directly.
    pub fn validate(&self) -> Result<()> {
        match self {
            RecurrenceRule::Daily { interval } => check_interval(*interval, "daily"),
            RecurrenceRule::Weekly {
                interval,
                days_of_week,
            } => {
                check_interval(*interval, "weekly")?;
                if days_of_week.is_empty() {
                    return Err(invalid("weekly recurrence needs a non-empty days_of_week"));
                }
                if let Some(day) = days_of_week.iter().find(|d| !(1..=7).contains(*d)) {
                    return Err(invalid(format!("weekday {day} is not an integer in 1..=7")));
                }
                Ok(())
            }
            RecurrenceRule::Custom { specific_dates } => {
                if specific_dates.is_empty() {
                    return Err(invalid("custom recurrence needs a non-empty specific_dates"));
                }
                Ok(())
            }
        }
    }

    pub fn recurrence_type(&self) -> RecurrenceType {
        match self {
            RecurrenceRule::Daily { .. } => RecurrenceType::Daily,
            RecurrenceRule::Weekly { .. } => RecurrenceType::Weekly,
            RecurrenceRule::Custom { .. } => RecurrenceType::Custom,
        }
    }

    /// Short human-readable summary, e.g. "every 2 weeks on Mon, Fri".
    pub fn describe(&self) -> String {
        const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        match self {
            RecurrenceRule::Daily { interval: 1 } => "every day".to_string(),
            RecurrenceRule::Daily { interval } => format!("every {interval} days"),
            RecurrenceRule::Weekly {
                interval,
                days_of_week,
            } => {
                let mut out = if *interval == 1 {
                    "every week on ".to_string()
                } else {
                    format!("every {interval} weeks on ")
                };
                for (i, day) in days_of_week.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let name = DAY_NAMES.get(usize::from(*day).wrapping_sub(1)).unwrap_or(&"?");
                    out.push_str(name);
                }
                out
            }
            RecurrenceRule::Custom { specific_dates } => {
                format!("custom ({} dates)", specific_dates.len())
            }
        }
    }
}

/// Validate a recurrence type together with its optional loose payload.
///
/// `None` ignores any payload and yields no rule. Every other type requires a
/// well-formed payload whose `type` tag matches.
pub fn validate(
    recurrence_type: RecurrenceType,
    pattern: Option<&Value>,
) -> Result<Option<RecurrenceRule>> {
    if recurrence_type == RecurrenceType::None {
        return Ok(None);
    }
    let pattern = pattern.ok_or_else(|| {
        invalid(format!("recurrence type {recurrence_type} requires a pattern"))
    })?;
    RecurrenceRule::parse(recurrence_type, pattern).map(Some)
}

/// Fill in the `type` tag of a payload that omits it.
///
/// Callers often send only `{"interval": 2}` alongside a separate type field.
pub fn prepare_pattern(recurrence_type: RecurrenceType, mut pattern: Value) -> Value {
    if let Value::Object(obj) = &mut pattern {
        obj.entry("type")
            .or_insert_with(|| Value::String(recurrence_type.pattern_tag().to_string()));
    }
    pattern
}

/// Reject a recurrence end more than `max_days` after the start.
pub fn validate_span(start: DateTime<Utc>, end: DateTime<Utc>, max_days: i64) -> Result<()> {
    if end - start > Duration::days(max_days) {
        return Err(SlotError::RecurrenceSpanExceeded {
            start,
            end,
            max_days,
        });
    }
    Ok(())
}

/// Expand a base occurrence into `[base, generated...]`.
///
/// The base is always first and keeps its own rule; every generated member
/// is non-recurring and points back at the base through `parent_id`. DAILY and
/// WEEKLY stop at `recurrence_end` (or `max_span_days` after the base start
/// when unset); all kinds stop at `max_generated_instances`. CUSTOM dates keep
/// their input order and silently skip entries that fail to parse.
///
/// # Errors
/// Returns `SlotError::InvalidRecurrencePattern` if the base carries a
/// malformed rule.
pub fn expand(base: &Occurrence, config: &EngineConfig) -> Result<Vec<Occurrence>> {
    let mut occurrences = vec![base.clone()];
    let Some(rule) = &base.recurrence else {
        return Ok(occurrences);
    };
    rule.validate()?;

    let limit = config.max_generated_instances;
    let horizon = base
        .recurrence_end
        .or_else(|| base.start.checked_add_signed(Duration::days(config.max_span_days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let starts = match rule {
        RecurrenceRule::Daily { interval } => daily_starts(base.start, *interval, horizon, limit),
        RecurrenceRule::Weekly {
            interval,
            days_of_week,
        } => weekly_starts(base.start, *interval, days_of_week, horizon, limit),
        RecurrenceRule::Custom { specific_dates } => custom_starts(specific_dates, limit),
    };

    tracing::debug!(
        base_id = %base.id,
        kind = %rule.recurrence_type(),
        generated = starts.len(),
        "expanded recurrence"
    );

    occurrences.extend(starts.into_iter().map(|start| base.spawn_child(start)));
    Ok(occurrences)
}

fn daily_starts(
    base_start: DateTime<Utc>,
    interval: u32,
    horizon: DateTime<Utc>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    let step = Duration::days(i64::from(interval));
    let mut starts = Vec::new();
    let mut current = base_start.checked_add_signed(step);

    while let Some(candidate) = current {
        if candidate > horizon || starts.len() >= limit {
            break;
        }
        starts.push(candidate);
        current = candidate.checked_add_signed(step);
    }
    starts
}

fn weekly_starts(
    base_start: DateTime<Utc>,
    interval: u32,
    days_of_week: &[u8],
    horizon: DateTime<Utc>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    // Rules built from the enum or deserialized skip `weekly()`'s normalization.
    let mut days = days_of_week.to_vec();
    days.sort_unstable();
    days.dedup();

    let offset_into_week = i64::from(base_start.weekday().number_from_monday()) - 1;
    let step = Duration::days(7 * i64::from(interval));
    let mut starts = Vec::new();
    // Monday of the base week, at the base time of day.
    let mut week_start = Some(base_start - Duration::days(offset_into_week));

    while let Some(monday) = week_start {
        if monday > horizon || starts.len() >= limit {
            break;
        }
        for day in &days {
            if starts.len() >= limit {
                break;
            }
            let candidate = monday + Duration::days(i64::from(*day) - 1);
            // Never before the base, never a second copy of the base itself.
            if candidate <= horizon && candidate > base_start {
                starts.push(candidate);
            }
        }
        week_start = monday.checked_add_signed(step);
    }
    starts
}

fn custom_starts(dates: &[String], limit: usize) -> Vec<DateTime<Utc>> {
    let mut starts = Vec::new();
    for raw in dates {
        if starts.len() >= limit {
            break;
        }
        match parse_instant(raw) {
            Some(start) => starts.push(start),
            None => tracing::debug!(date = %raw, "skipping unparseable custom date"),
        }
    }
    starts
}

/// Parse an ISO 8601 datetime into UTC.
///
/// Accepts RFC 3339 with an offset or `Z`, offsets without seconds, naive
/// datetimes (read as UTC, with `T` or a space, seconds optional) and bare
/// dates (midnight UTC).
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M:%S%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

fn read_interval(value: Option<&Value>, kind: &str) -> Result<u32> {
    let value = value.ok_or_else(|| invalid(format!("{kind} recurrence needs an interval")))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| invalid(format!("{kind} interval {value} is not a positive integer")))
}

fn check_interval(interval: u32, kind: &str) -> Result<()> {
    if interval < 1 {
        return Err(invalid(format!("{kind} interval must be a positive integer")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> SlotError {
    SlotError::InvalidRecurrencePattern(message.into())
}
