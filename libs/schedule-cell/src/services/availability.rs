// libs/schedule-cell/src/services/availability.rs
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DayConfig, DaySchedule, ScheduleError, ScheduleOverride, Slot};
use crate::services::slots::generate_slots;

/// Start times of appointments already holding a slot on the day.
#[derive(Debug, Deserialize)]
struct BookedStart {
    start_time: NaiveTime,
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Bookable slots for one provider/service/date: override-first config
    /// resolution, the fixed grid, minus already-booked start times.
    /// Read-only; resolving twice returns the same answer.
    pub async fn resolve(
        &self,
        provider_id: &str,
        service_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<Slot>, ScheduleError> {
        debug!("Resolving availability for provider {} service {} on {}", provider_id, service_id, date);

        let config = match self.resolve_day_config(provider_id, service_id, date, auth_token).await? {
            Some(config) => config,
            None => return Ok(vec![]),
        };

        let mut slots = generate_slots(&config);
        if slots.is_empty() {
            return Ok(slots);
        }

        let booked = self.get_booked_starts(provider_id, service_id, date, auth_token).await?;
        slots.retain(|slot| !booked.contains(&slot.time));

        debug!("Found {} bookable slots on {}", slots.len(), date);
        Ok(slots)
    }

    /// Which day config (if any) governs this date. An override wins over
    /// the weekly pattern; a closed override or an absent/unavailable
    /// weekly row means the date is simply not bookable. Booking validates
    /// against the same config the dashboard shows.
    pub async fn resolve_day_config(
        &self,
        provider_id: &str,
        service_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Option<DayConfig>, ScheduleError> {
        if let Some(override_row) = self.get_override(provider_id, service_id, date, auth_token).await? {
            if !override_row.is_available {
                debug!("Override closes {} for provider {}", date, provider_id);
                return Ok(None);
            }
            return Ok(override_row.day_config());
        }

        let day_of_week = day_of_week(date);
        let schedule = match self.get_weekly_day(provider_id, service_id, day_of_week, auth_token).await? {
            Some(schedule) => schedule,
            None => return Ok(None),
        };

        Ok(schedule.day_config())
    }

    async fn get_override(
        &self,
        provider_id: &str,
        service_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Option<ScheduleOverride>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_overrides?provider_id=eq.{}&service_id=eq.{}&override_date=eq.{}",
            provider_id, service_id, date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| ScheduleError::DatabaseError(e.to_string())),
            None => Ok(None),
        }
    }

    async fn get_weekly_day(
        &self,
        provider_id: &str,
        service_id: &str,
        day_of_week: i16,
        auth_token: Option<&str>,
    ) -> Result<Option<DaySchedule>, ScheduleError> {
        let path = format!(
            "/rest/v1/weekly_schedules?provider_id=eq.{}&service_id=eq.{}&day_of_week=eq.{}",
            provider_id, service_id, day_of_week
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| ScheduleError::DatabaseError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Cancelled rows release their slot; everything else keeps blocking it.
    async fn get_booked_starts(
        &self,
        provider_id: &str,
        service_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<NaiveTime>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&service_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&select=start_time&order=start_time.asc",
            provider_id, service_id, date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let booked: Vec<BookedStart> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookedStart>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(booked.into_iter().map(|b| b.start_time).collect())
    }
}

/// 0 = Sunday .. 6 = Saturday, matching the stored day_of_week column.
pub fn day_of_week(date: NaiveDate) -> i16 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}
