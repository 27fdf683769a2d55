use thiserror::Error;

/// Domain-level error type.
///
/// Kept deliberately small: the engine itself never fails (malformed
/// schedule entries are skipped), so these variants surface only where
/// input is validated up front, e.g. on the admin surface.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A time-of-day string that is not `HH:MM` within 00:00..=23:59.
    #[error("invalid time of day '{0}': expected HH:MM")]
    InvalidTimeOfDay(String),

    /// A schedule key that is not a lowercase English weekday name.
    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),

    /// Any other input validation failure, with a user-visible message.
    #[error("{0}")]
    Validation(String),
}
