// libs/schedule-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use thiserror::Error;

// ==============================================================================
// CORE SCHEDULE MODELS
// ==============================================================================

/// One weekday of a provider's recurring pattern for a service offering.
/// Times are provider-local wall clock; the engine never converts zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub day_of_week: i16, // 0 = Sunday .. 6 = Saturday
    pub is_available: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub slot_minutes: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Date-specific exception. When present it fully supersedes the weekly
/// pattern for that date; `is_available = false` closes the date outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub override_date: NaiveDate,
    pub is_available: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub slot_minutes: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The resolved shape of a single day, whichever row it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DayConfig {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub break_window: Option<BreakWindow>,
    pub slot_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BreakWindow {
    fn from_bounds(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Some(Self { start, end }),
            _ => None,
        }
    }
}

impl DaySchedule {
    pub fn day_config(&self) -> Option<DayConfig> {
        if !self.is_available {
            return None;
        }
        Some(DayConfig {
            start_time: self.start_time,
            end_time: self.end_time,
            break_window: BreakWindow::from_bounds(self.break_start, self.break_end),
            slot_minutes: self.slot_minutes,
        })
    }
}

impl ScheduleOverride {
    pub fn day_config(&self) -> Option<DayConfig> {
        if !self.is_available {
            return None;
        }
        Some(DayConfig {
            start_time: self.start_time,
            end_time: self.end_time,
            break_window: BreakWindow::from_bounds(self.break_start, self.break_end),
            slot_minutes: self.slot_minutes,
        })
    }
}

/// A bookable slot: a start time on the day's fixed grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub time: NaiveTime,
    pub duration_minutes: i32,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// One day as submitted by the dashboard's week editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayConfigInput {
    pub is_available: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub notes: Option<String>,
}

impl DayConfigInput {
    /// An available day must hold a coherent window; unavailable days carry
    /// no constraints and keep whatever times were supplied.
    pub fn validate(&self, label: &str) -> Result<(), ScheduleError> {
        if !self.is_available {
            return Ok(());
        }

        let (start, end) = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(ScheduleError::InvalidConfig(format!(
                    "{}: available days need start and end times", label
                )));
            }
        };

        if start >= end {
            return Err(ScheduleError::InvalidConfig(format!(
                "{}: start time must be before end time", label
            )));
        }

        if self.slot_minutes.unwrap_or(0) <= 0 {
            return Err(ScheduleError::InvalidConfig(format!(
                "{}: slot duration must be positive", label
            )));
        }

        match (self.break_start, self.break_end) {
            (None, None) => {}
            (Some(break_start), Some(break_end)) => {
                if !(start <= break_start && break_start < break_end && break_end <= end) {
                    return Err(ScheduleError::InvalidConfig(format!(
                        "{}: break must sit inside the working window", label
                    )));
                }
            }
            _ => {
                return Err(ScheduleError::InvalidConfig(format!(
                    "{}: break needs both start and end times", label
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceWeekRequest {
    /// Keyed by day_of_week (0 = Sunday). Days missing from the map are
    /// written as unavailable; a save is always the full week.
    pub days: std::collections::BTreeMap<u8, DayConfigInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchServiceRequest {
    pub to_service_id: Uuid,
    /// Unsaved week editor state for the offering being left behind.
    pub pending_days: Option<std::collections::BTreeMap<u8, DayConfigInput>>,
}

#[derive(Debug, Serialize)]
pub struct SwitchServiceResponse {
    pub week: Vec<DaySchedule>,
    pub autosave_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOverrideRequest {
    pub override_date: NaiveDate,
    pub is_available: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub notes: Option<String>,
}

impl CreateOverrideRequest {
    pub fn as_day_input(&self) -> DayConfigInput {
        DayConfigInput {
            is_available: self.is_available,
            start_time: self.start_time,
            end_time: self.end_time,
            break_start: self.break_start,
            break_end: self.break_end,
            slot_minutes: self.slot_minutes,
            notes: self.notes.clone(),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid schedule configuration: {0}")]
    InvalidConfig(String),

    #[error("An override already exists for {0}")]
    DuplicateOverride(NaiveDate),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
