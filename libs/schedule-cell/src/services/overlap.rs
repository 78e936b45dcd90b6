//! Half-open interval math shared by the conflict check, the exception
//! window filter and the slot generator.

use chrono::{NaiveTime, Timelike};

/// Minutes since midnight; generation and overlap math work on these
/// instead of wall-clock types.
pub fn minutes_since_midnight(t: NaiveTime) -> i32 {
    (t.hour() * 60 + t.minute()) as i32
}

/// Whether two `[start, end)` windows overlap. Symmetric; windows that
/// merely touch (`a_end == b_start`) do not overlap.
pub fn windows_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}
