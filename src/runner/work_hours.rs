use chrono::{Local, Timelike};

use crate::domain::WorkHoursBlock;

fn parse_minute_of_day(raw: &str) -> Option<u32> {
    let (h, m) = raw.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Whether `minute_of_day` falls inside any window. Windows with
/// `start > end` wrap midnight; malformed windows are skipped; no windows
/// means always in-hours.
pub fn within_work_hours_at(blocks: &[WorkHoursBlock], minute_of_day: u32) -> bool {
    if blocks.is_empty() {
        return true;
    }

    for block in blocks {
        let (Some(start), Some(end)) = (
            parse_minute_of_day(&block.start),
            parse_minute_of_day(&block.end),
        ) else {
            continue;
        };

        let inside = if start <= end {
            start <= minute_of_day && minute_of_day <= end
        } else {
            minute_of_day >= start || minute_of_day <= end
        };
        if inside {
            return true;
        }
    }

    false
}

/// Evaluate the gate against local wall-clock time.
pub fn within_work_hours(blocks: &[WorkHoursBlock]) -> bool {
    let now = Local::now();
    within_work_hours_at(blocks, now.hour() * 60 + now.minute())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: &str, end: &str) -> WorkHoursBlock {
        WorkHoursBlock {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn minutes(h: u32, m: u32) -> u32 {
        h * 60 + m
    }

    #[test]
    fn no_windows_means_always_in_hours() {
        assert!(within_work_hours_at(&[], minutes(3, 0)));
    }

    #[test]
    fn plain_window_is_inclusive_on_both_ends() {
        let blocks = [block("09:00", "17:00")];
        assert!(within_work_hours_at(&blocks, minutes(9, 0)));
        assert!(within_work_hours_at(&blocks, minutes(17, 0)));
        assert!(!within_work_hours_at(&blocks, minutes(8, 59)));
        assert!(!within_work_hours_at(&blocks, minutes(17, 1)));
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let blocks = [block("22:00", "06:00")];
        assert!(within_work_hours_at(&blocks, minutes(23, 30)));
        assert!(within_work_hours_at(&blocks, minutes(5, 30)));
        assert!(!within_work_hours_at(&blocks, minutes(7, 0)));
    }

    #[test]
    fn malformed_windows_are_skipped() {
        let blocks = [block("25:00", "06:00"), block("10:00", "11:00")];
        assert!(within_work_hours_at(&blocks, minutes(10, 30)));
        assert!(!within_work_hours_at(&blocks, minutes(23, 0)));
    }

    #[test]
    fn any_matching_window_wins() {
        let blocks = [block("01:00", "02:00"), block("22:00", "23:00")];
        assert!(within_work_hours_at(&blocks, minutes(22, 30)));
        assert!(!within_work_hours_at(&blocks, minutes(12, 0)));
    }
}
