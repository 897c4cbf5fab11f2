//! Replay Time Base
//!
//! All replay time is integer nanoseconds since the Unix epoch. Nothing in the
//! replication engine reads system time; timestamps come from the input records.

/// Nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
/// i64 gives us ~292 years of range, sufficient for any replay window.
pub type Nanos = i64;

/// Conversion constants
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert a millisecond duration to nanoseconds, saturating on overflow.
#[inline]
pub fn millis_to_nanos(ms: i64) -> Nanos {
    ms.saturating_mul(NANOS_PER_MILLI)
}

/// Convert a nanosecond duration to fractional milliseconds.
#[inline]
pub fn nanos_to_millis_f64(ns: Nanos) -> f64 {
    ns as f64 / NANOS_PER_MILLI as f64
}

/// Convert a seconds duration to nanoseconds, saturating on overflow.
#[inline]
pub fn secs_to_nanos(secs: i64) -> Nanos {
    secs.saturating_mul(NANOS_PER_SEC)
}

/// Format a timestamp for log lines (RFC 3339, millisecond precision).
pub fn format_nanos(ts: Nanos) -> String {
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp_nanos(ts);
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
