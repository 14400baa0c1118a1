// libs/schedule-cell/src/services/week.rs
use std::collections::BTreeMap;

use chrono::{NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DayConfigInput, DaySchedule, ScheduleError, SwitchServiceRequest, SwitchServiceResponse,
};

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Full weekly pattern for a provider's service offering.
    pub async fn get_week(
        &self,
        provider_id: &str,
        service_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<DaySchedule>, ScheduleError> {
        debug!("Fetching week for provider {} service {}", provider_id, service_id);

        let path = format!(
            "/rest/v1/weekly_schedules?provider_id=eq.{}&service_id=eq.{}&order=day_of_week.asc",
            provider_id, service_id
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DaySchedule>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    /// Replaces the whole week in one upsert batch. Every save writes all
    /// seven rows; days missing from the input become unavailable. No row
    /// is deleted, so the unique (provider, service, day) key makes the
    /// write idempotent.
    pub async fn replace_week(
        &self,
        provider_id: &str,
        service_id: &str,
        days: &BTreeMap<u8, DayConfigInput>,
        auth_token: &str,
    ) -> Result<Vec<DaySchedule>, ScheduleError> {
        debug!("Replacing week for provider {} service {}", provider_id, service_id);

        // Validate everything before writing anything.
        for (day, input) in days {
            if *day > 6 {
                return Err(ScheduleError::InvalidConfig(format!(
                    "day_of_week {} is out of range", day
                )));
            }
            input.validate(&format!("day {}", day))?;
        }

        let now = Utc::now().to_rfc3339();
        let rows: Vec<Value> = (0u8..7)
            .map(|day| match days.get(&day) {
                Some(input) => json!({
                    "provider_id": provider_id,
                    "service_id": service_id,
                    "day_of_week": day,
                    "is_available": input.is_available,
                    "start_time": input.start_time.map(format_time),
                    "end_time": input.end_time.map(format_time),
                    "break_start": input.break_start.map(format_time),
                    "break_end": input.break_end.map(format_time),
                    "slot_minutes": input.slot_minutes.unwrap_or(0),
                    "notes": input.notes,
                    "updated_at": now,
                }),
                None => json!({
                    "provider_id": provider_id,
                    "service_id": service_id,
                    "day_of_week": day,
                    "is_available": false,
                    "start_time": null,
                    "end_time": null,
                    "break_start": null,
                    "break_end": null,
                    "slot_minutes": 0,
                    "notes": null,
                    "updated_at": now,
                }),
            })
            .collect();

        let path = "/rest/v1/weekly_schedules?on_conflict=provider_id,service_id,day_of_week";
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation,resolution=merge-duplicates"),
        );

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            path,
            Some(auth_token),
            Some(Value::Array(rows)),
            Some(headers),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let mut week = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DaySchedule>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;
        week.sort_by_key(|day| day.day_of_week);

        debug!("Week replaced for provider {} service {}", provider_id, service_id);
        Ok(week)
    }

    /// Moves the dashboard from one service offering to another. Pending
    /// edits for the offering being left are autosaved best-effort: a
    /// failed or invalid autosave becomes a warning on the response and
    /// never blocks the switch.
    pub async fn switch_service(
        &self,
        provider_id: &str,
        from_service_id: &str,
        request: SwitchServiceRequest,
        auth_token: &str,
    ) -> Result<SwitchServiceResponse, ScheduleError> {
        debug!(
            "Switching provider {} from service {} to {}",
            provider_id, from_service_id, request.to_service_id
        );

        let mut autosave_warning = None;
        if let Some(pending) = &request.pending_days {
            if let Err(e) = self.replace_week(provider_id, from_service_id, pending, auth_token).await {
                warn!("Autosave failed while switching away from service {}: {}", from_service_id, e);
                autosave_warning = Some(format!("Pending changes were not saved: {}", e));
            }
        }

        let week = self.get_week(
            provider_id,
            &request.to_service_id.to_string(),
            Some(auth_token),
        ).await?;

        Ok(SwitchServiceResponse { week, autosave_warning })
    }
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}
