//! External services for the domain aggregates.
//!
//! Services provide external dependencies (like time) to the aggregates
//! without coupling them to specific implementations.

use crate::domain::types::TimestampUtc;

/// Services injected into every aggregate for command handling.
#[derive(Debug, Clone, Default)]
pub struct DomainServices {
    pub clock: DomainClock,
}

/// Clock service for timestamp generation.
#[derive(Debug, Clone, Default)]
pub struct DomainClock;

impl DomainClock {
    /// Returns the current UTC timestamp.
    pub fn now(&self) -> TimestampUtc {
        TimestampUtc::now()
    }
}
