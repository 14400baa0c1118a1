// libs/schedule-cell/src/services/overrides.rs
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::{StorageError, SupabaseClient};

use crate::models::{CreateOverrideRequest, ScheduleError, ScheduleOverride};

pub struct OverrideService {
    supabase: SupabaseClient,
}

impl OverrideService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Insert-only: the unique key on (provider, service, date) turns a
    /// duplicate create into a storage conflict, so there is no
    /// read-before-write to race against.
    pub async fn create_override(
        &self,
        provider_id: &str,
        service_id: &str,
        request: CreateOverrideRequest,
        auth_token: &str,
    ) -> Result<ScheduleOverride, ScheduleError> {
        debug!("Creating schedule override for provider {} on {}", provider_id, request.override_date);

        request.as_day_input().validate("override")?;

        let override_data = json!({
            "provider_id": provider_id,
            "service_id": service_id,
            "override_date": request.override_date,
            "is_available": request.is_available,
            "start_time": request.start_time.map(format_time),
            "end_time": request.end_time.map(format_time),
            "break_start": request.break_start.map(format_time),
            "break_end": request.break_end.map(format_time),
            "slot_minutes": request.slot_minutes.unwrap_or(0),
            "notes": request.notes,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/schedule_overrides",
            Some(auth_token),
            Some(override_data),
            Some(headers),
        ).await.map_err(|e| match e {
            StorageError::Conflict(_) => ScheduleError::DuplicateOverride(request.override_date),
            other => ScheduleError::DatabaseError(other.to_string()),
        })?;

        let row = result.into_iter().next()
            .ok_or_else(|| ScheduleError::DatabaseError("Override insert returned no row".to_string()))?;
        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn list_overrides(
        &self,
        provider_id: &str,
        service_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ScheduleOverride>, ScheduleError> {
        debug!("Listing overrides for provider {} between {} and {}", provider_id, from, to);

        let path = format!(
            "/rest/v1/schedule_overrides?provider_id=eq.{}&service_id=eq.{}&override_date=gte.{}&override_date=lte.{}&order=override_date.asc",
            provider_id, service_id, from, to
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleOverride>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    /// Removing the exception puts the weekly pattern back in charge.
    pub async fn delete_override(
        &self,
        provider_id: &str,
        service_id: &str,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        debug!("Deleting schedule override for provider {} on {}", provider_id, date);

        let path = format!(
            "/rest/v1/schedule_overrides?provider_id=eq.{}&service_id=eq.{}&override_date=eq.{}",
            provider_id, service_id, date
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(headers),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}
