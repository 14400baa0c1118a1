// libs/booking-cell/src/services/lifecycle.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentStatus, BookingError, ClinicalOutcome, TransitionRequest};

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition from {:?} to {:?}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!("Invalid status transition attempted: {:?} -> {:?}", current_status, new_status);
            return Err(BookingError::InvalidTransition {
                from: current_status.clone(),
                to: new_status.clone(),
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::NoShow => vec![],
        }
    }

    /// The statuses an appointment may currently hold for `target` to be a
    /// legal next step. This is what the compare-and-swap filter is built
    /// from.
    pub fn valid_sources(&self, target: &AppointmentStatus) -> Vec<AppointmentStatus> {
        AppointmentStatus::ALL
            .into_iter()
            .filter(|status| self.get_valid_transitions(status).contains(target))
            .collect()
    }

    /// Move an appointment to a new status. The update is a single
    /// conditional write: the row is only touched while its status is
    /// still one of the legal sources, so two racing transitions cannot
    /// both win. An empty update result is classified afterwards by
    /// re-reading the row.
    pub async fn transition_appointment(
        &self,
        appointment_id: &str,
        request: TransitionRequest,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let target = request.new_status.clone();
        info!("Transitioning appointment {} to {}", appointment_id, target);

        let sources = self.valid_sources(&target);
        if sources.is_empty() {
            // Nothing transitions into this status; classify without writing.
            return Err(self.classify_failed_transition(appointment_id, &target, auth_token).await);
        }

        let source_list = sources
            .iter()
            .map(|status| status.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(target.to_string()));
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        if target == AppointmentStatus::Cancelled {
            update_data.insert("cancellation_reason".to_string(), json!(request.reason));
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=in.({})",
            appointment_id, source_list
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = match result.into_iter().next() {
            Some(row) => row,
            None => {
                return Err(self.classify_failed_transition(appointment_id, &target, auth_token).await);
            }
        };

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        self.append_audit_note(&appointment, &request, actor_id, auth_token).await?;

        if target == AppointmentStatus::Completed {
            if let Some(outcome) = &request.outcome {
                self.create_consultation_record(&appointment, outcome, auth_token).await?;
            }
        }

        info!("Appointment {} transitioned to {}", appointment.id, appointment.status);
        Ok(appointment)
    }

    /// Decide why a conditional update matched nothing. The row is re-read
    /// without a status filter; by the time we look it may have moved
    /// again, which still yields the right category.
    async fn classify_failed_transition(
        &self,
        appointment_id: &str,
        target: &AppointmentStatus,
        auth_token: &str,
    ) -> BookingError {
        let current = match self.fetch_current(appointment_id, auth_token).await {
            Ok(current) => current,
            Err(e) => return e,
        };

        match current {
            None => BookingError::NotFound,
            Some(appointment) if appointment.status.is_closed() => {
                BookingError::AppointmentClosed(appointment.status)
            }
            Some(appointment) => BookingError::InvalidTransition {
                from: appointment.status,
                to: target.clone(),
            },
        }
    }

    async fn fetch_current(
        &self,
        appointment_id: &str,
        auth_token: &str,
    ) -> Result<Option<Appointment>, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            None => Ok(None),
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e))),
        }
    }

    async fn append_audit_note(
        &self,
        appointment: &Appointment,
        request: &TransitionRequest,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let body = match &request.reason {
            Some(reason) => format!("Status changed to {}: {}", appointment.status, reason),
            None => format!("Status changed to {}", appointment.status),
        };

        let note_data = json!({
            "appointment_id": appointment.id,
            "author_id": actor_id,
            "body": body,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointment_notes",
            Some(auth_token),
            Some(note_data),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn create_consultation_record(
        &self,
        appointment: &Appointment,
        outcome: &ClinicalOutcome,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        debug!("Recording consultation outcome for appointment {}", appointment.id);

        let record_data = json!({
            "appointment_id": appointment.id,
            "provider_id": appointment.provider_id,
            "patient_id": appointment.patient_id,
            "diagnosis": outcome.diagnosis,
            "treatment": outcome.treatment,
            "prescription": outcome.prescription,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/consultation_records",
            Some(auth_token),
            Some(record_data),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
