//! Engine limits and local-time settings.
//!
//! Defaults mirror the booking rules: at most 60 generated instances per
//! expansion, a 60-day recurrence span, and GMT+8 as the wall-clock zone users
//! pick dates in.

use std::env;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

pub const DEFAULT_MAX_GENERATED_INSTANCES: usize = 60;
pub const DEFAULT_MAX_SPAN_DAYS: i64 = 60;
pub const DEFAULT_LOCAL_TIMEZONE: &str = "Asia/Shanghai";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on generated members per expansion (the base is extra).
    pub max_generated_instances: usize,
    /// Longest allowed `recurrence_end - start`, and the DAILY/WEEKLY horizon
    /// when no end is set.
    pub max_span_days: i64,
    /// IANA zone for interpreting user-entered local dates and times.
    pub local_timezone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_generated_instances: DEFAULT_MAX_GENERATED_INSTANCES,
            max_span_days: DEFAULT_MAX_SPAN_DAYS,
            local_timezone: DEFAULT_LOCAL_TIMEZONE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Build from `SLOT_MAX_INSTANCES`, `SLOT_MAX_SPAN_DAYS` and
    /// `SLOT_TIMEZONE`, after loading `.env`. Absent or unparseable values fall
    /// back to the defaults.
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();
        Self {
            max_generated_instances: env_parsed(
                "SLOT_MAX_INSTANCES",
                defaults.max_generated_instances,
            ),
            max_span_days: env_parsed("SLOT_MAX_SPAN_DAYS", defaults.max_span_days),
            local_timezone: env_parsed("SLOT_TIMEZONE", defaults.local_timezone),
        }
    }

    /// The configured local zone.
    ///
    /// # Errors
    /// Returns `SlotError::InvalidTimezone` if the name is not a valid IANA identifier.
    pub fn timezone(&self) -> Result<Tz> {
        self.local_timezone
            .parse()
            .map_err(|_| SlotError::InvalidTimezone(self.local_timezone.clone()))
    }
}
