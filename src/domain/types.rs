//! Strongly typed domain primitives shared by the employee actors.
//!
//! These newtypes give type safety to identifiers and schedule settings and
//! fix the address derivation rules used to reach child actors.

use crate::domain::errors::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Address prefix of the location tracker child.
pub const LOCATIONS_PREFIX: &str = "locations_";

/// Address prefix of the digest scheduler child.
pub const NOTIFICATIONS_PREFIX: &str = "notifications_";

/// Caller-supplied employee identifier.
/// Doubles as the address of the employee root actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Address of the location tracker owned by this employee.
    pub fn locations_address(&self) -> String {
        format!("{}{}", LOCATIONS_PREFIX, self.0)
    }

    /// Address of the digest scheduler owned by this employee.
    pub fn notifications_address(&self) -> String {
        format!("{}{}", NOTIFICATIONS_PREFIX, self.0)
    }
}

impl From<&str> for EmployeeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EmployeeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How often an employee receives a notification digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Never,
    #[default]
    Daily,
    Monday,
    Friday,
}

impl Frequency {
    /// Wire name, as accepted by the delay computation activity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Never => "NEVER",
            Frequency::Daily => "DAILY",
            Frequency::Monday => "MONDAY",
            Frequency::Friday => "FRIDAY",
        }
    }

    /// Returns true if digests are scheduled at all for this frequency.
    pub fn is_scheduled(&self) -> bool {
        !matches!(self, Frequency::Never)
    }
}

impl FromStr for Frequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEVER" => Ok(Frequency::Never),
            "DAILY" => Ok(Frequency::Daily),
            "MONDAY" => Ok(Frequency::Monday),
            "FRIDAY" => Ok(Frequency::Friday),
            other => Err(DomainError::InvalidInput {
                message: format!("unknown notification frequency '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp wrapper for UTC times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns this timestamp shifted forward by `seconds`, saturating at the
    /// maximum representable time.
    pub fn plus_seconds(&self, seconds: u64) -> Self {
        let delta = i64::try_from(seconds)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds);
        match delta.and_then(|d| self.0.checked_add_signed(d)) {
            Some(t) => Self(t),
            None => Self(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Time left until this timestamp, zero if it already passed.
    pub fn remaining_from(&self, now: TimestampUtc) -> Duration {
        (self.0 - now.0).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns the timestamp as an RFC3339 string.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_addresses_are_derived_from_id() {
        let id = EmployeeId::from("E1");
        assert_eq!(id.locations_address(), "locations_E1");
        assert_eq!(id.notifications_address(), "notifications_E1");
    }

    #[test]
    fn test_frequency_parses_case_insensitively() {
        assert_eq!("monday".parse::<Frequency>().unwrap(), Frequency::Monday);
        assert_eq!(" DAILY ".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert!("WEDNESDAY".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_frequency_serializes_as_wire_name() {
        let json = serde_json::to_string(&Frequency::Friday).unwrap();
        assert_eq!(json, "\"FRIDAY\"");
    }

    #[test]
    fn test_remaining_from_saturates_at_zero() {
        let now = TimestampUtc::now();
        let past = TimestampUtc(now.0 - chrono::TimeDelta::seconds(10));
        assert_eq!(past.remaining_from(now), Duration::ZERO);
        let later = now.plus_seconds(30);
        assert_eq!(later.remaining_from(now), Duration::from_secs(30));
    }
}
