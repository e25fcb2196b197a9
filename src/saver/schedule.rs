//! Reset scheduling on a grid aligned to local midnight
//!
//! A saver with interval `I` resets at `midnight + k * I` for integer `k`, no
//! matter when the process started or the saver was registered. Savers with the
//! same interval therefore reset in lockstep (24h at midnight, 1h on the hour).
//!
//! Rollover is lazy: it is only evaluated when a reading arrives.
//!
//! Timezone handling: midnight is taken in the UTC offset in effect when the
//! boundary is first computed. Later rollovers advance in absolute seconds, so
//! after a DST change the wall-clock reset time drifts by the offset delta
//! until the saver is re-created.

use crate::saver::error::SaverError;
use crate::saver::types::{Extreme, SaverEntry};
use chrono::{DateTime, Duration, FixedOffset, Local, Timelike};

pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Upper bound on intervals (100 years) so timestamp arithmetic cannot overflow
pub const MAX_INTERVAL_SECS: i64 = 100 * 366 * 24 * 3600;

/// Current time with the local UTC offset
pub fn local_now() -> DateTime<FixedOffset> {
    DateTime::<FixedOffset>::from(Local::now())
}

/// Convert a registration payload in hours to whole seconds
///
/// Fractional hours are allowed (`"0.25"` is 900s). Non-numeric, non-finite,
/// non-positive and sub-second results are rejected.
pub fn parse_interval_hours(payload: &str) -> Result<i64, SaverError> {
    let invalid = || SaverError::InvalidInterval(payload.to_string());

    let hours: f64 = payload.trim().parse().map_err(|_| invalid())?;
    if !hours.is_finite() || hours <= 0.0 {
        return Err(invalid());
    }

    let secs = (hours * SECONDS_PER_HOUR).round();
    if secs < 1.0 || secs > MAX_INTERVAL_SECS as f64 {
        return Err(invalid());
    }

    Ok(secs as i64)
}

/// Local midnight of `now`'s day, in `now`'s offset
pub fn local_midnight(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now - Duration::seconds(i64::from(now.num_seconds_from_midnight()))
        - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// First grid point strictly after `now`
///
/// Same result as starting at midnight and adding `interval_secs` until the
/// boundary passes `now`, without the loop.
pub fn next_boundary(interval_secs: i64, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    debug_assert!(interval_secs > 0, "reset interval must be positive");
    let interval_secs = interval_secs.max(1);

    let midnight = local_midnight(now);
    let elapsed = (now - midnight).num_seconds();
    let steps = elapsed / interval_secs + 1;

    midnight + Duration::seconds(steps * interval_secs)
}

/// Start a new window if `now` is past the entry's boundary
///
/// The boundary advances by whole intervals from its previous value, staying
/// on the original grid, until it is strictly after `now`. Returns true if the
/// window rolled (the extreme is then `Absent`). Calling twice with the same
/// `now` rolls at most once.
pub fn check_and_roll(entry: &mut SaverEntry, now: DateTime<FixedOffset>) -> bool {
    if now <= entry.next_reset_at {
        return false;
    }

    let interval_secs = entry.reset_interval_secs.max(1);
    let overdue = (now - entry.next_reset_at).num_seconds();
    let steps = overdue / interval_secs + 1;

    entry.next_reset_at = entry.next_reset_at + Duration::seconds(steps * interval_secs);
    entry.extreme = Extreme::Absent;
    true
}
