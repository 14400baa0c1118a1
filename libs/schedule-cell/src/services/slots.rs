// libs/schedule-cell/src/services/slots.rs
use chrono::{Duration, NaiveTime};

use crate::models::{DayConfig, Slot};

/// Expands a day's working window into its fixed slot grid.
///
/// Slots step from the window start in `slot_minutes` increments. A start
/// time is emitted when the whole slot fits before the window end and the
/// start does not fall inside the break; the grid itself never shifts, so a
/// break that is not slot-aligned swallows every grid point it covers. A
/// degenerate config (missing times, inverted window, non-positive duration)
/// yields an empty day rather than an error.
pub fn generate_slots(config: &DayConfig) -> Vec<Slot> {
    let (start, end) = match (config.start_time, config.end_time) {
        (Some(start), Some(end)) => (start, end),
        _ => return Vec::new(),
    };
    if config.slot_minutes <= 0 || start >= end {
        return Vec::new();
    }

    let step = Duration::minutes(config.slot_minutes as i64);
    let mut slots = Vec::new();
    let mut current = start;

    loop {
        // Stepping past midnight wraps; no slot crosses it.
        let (slot_end, wrapped) = current.overflowing_add_signed(step);
        if wrapped != 0 || slot_end > end {
            break;
        }
        if !in_break(config, current) {
            slots.push(Slot {
                time: current,
                duration_minutes: config.slot_minutes,
            });
        }
        current = slot_end;
    }

    slots
}

fn in_break(config: &DayConfig, time: NaiveTime) -> bool {
    match &config.break_window {
        Some(window) => time >= window.start && time < window.end,
        None => false,
    }
}
