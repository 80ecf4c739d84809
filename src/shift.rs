use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::ShiftLabel;

/// Sessions longer than this are not attributed to a shift.
pub const MAX_SHIFT_SESSION_MINUTES: f64 = 30.0;

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Buckets a session by its start time of day. The duration gate is checked
/// first; the buckets are then checked in order 3, 1, 2.
pub fn classify(start: NaiveTime, duration_minutes: f64) -> ShiftLabel {
    if duration_minutes.is_nan() || duration_minutes > MAX_SHIFT_SESSION_MINUTES {
        return ShiftLabel::NoRecord;
    }

    if start < hm(6, 0) {
        ShiftLabel::Shift3
    } else if start < hm(14, 0) {
        ShiftLabel::Shift1
    } else if start < hm(22, 0) {
        ShiftLabel::Shift2
    } else {
        ShiftLabel::NoRecord
    }
}

pub fn classify_session(start: Option<NaiveDateTime>, duration_minutes: Option<f64>) -> ShiftLabel {
    match (start, duration_minutes) {
        (Some(start), Some(duration)) => classify(start.time(), duration),
        _ => ShiftLabel::NoRecord,
    }
}

/// Work ending before 06:35 belongs to the previous production day.
pub fn adjust_completion_date(end: Option<NaiveDateTime>) -> Option<NaiveDate> {
    let end = end?;
    if end.time() < hm(6, 35) {
        Some((end - Duration::days(1)).date())
    } else {
        Some(end.date())
    }
}
