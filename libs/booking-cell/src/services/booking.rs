// libs/booking-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::{StorageError, SupabaseClient};
use schedule_cell::services::availability::AvailabilityService;
use schedule_cell::services::slots::generate_slots;

use crate::models::{Appointment, AppointmentStatus, BookAppointmentRequest, BookingError};

pub struct BookingService {
    supabase: SupabaseClient,
    availability_service: AvailabilityService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability_service: AvailabilityService::new(config),
        }
    }

    /// Book a slot. The request is checked against the day's slot grid,
    /// then written in one insert. Double-booking is left to the partial
    /// unique index on active appointments: a lost race comes back as a
    /// storage conflict, never as corrupt data. There is deliberately no
    /// availability read between the grid check and the insert.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        info!(
            "Booking appointment for patient {} with provider {} on {}",
            request.patient_id, request.provider_id, request.appointment_date
        );

        let provider_id = request.provider_id.to_string();
        let service_id = request.service_id.to_string();

        let day_config = self.availability_service
            .resolve_day_config(&provider_id, &service_id, request.appointment_date, Some(auth_token))
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let day_config = match day_config {
            Some(config) => config,
            None => return Err(BookingError::NotBookable(request.appointment_date)),
        };

        let slot = generate_slots(&day_config)
            .into_iter()
            .find(|slot| slot.time == request.start_time)
            .ok_or(BookingError::InvalidSlot)?;

        let now = Utc::now();
        let appointment_data = json!({
            "provider_id": request.provider_id,
            "service_id": request.service_id,
            "patient_id": request.patient_id,
            "appointment_date": request.appointment_date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "duration_minutes": slot.duration_minutes,
            "status": AppointmentStatus::Scheduled.to_string(),
            "fee": request.fee,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| match e {
            StorageError::Conflict(_) => BookingError::SlotConflict,
            other => BookingError::DatabaseError(other.to_string()),
        })?;

        let row = result.into_iter().next()
            .ok_or_else(|| BookingError::DatabaseError("Failed to create appointment".to_string()))?;

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse created appointment: {}", e)))?;

        if let Some(notes) = &request.notes {
            self.append_booking_note(&appointment, notes, auth_token).await?;
        }

        info!(
            "Appointment {} booked at {} for {} minutes",
            appointment.id, appointment.start_time, appointment.duration_minutes
        );
        Ok(appointment)
    }

    async fn append_booking_note(
        &self,
        appointment: &Appointment,
        body: &str,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        debug!("Attaching booking note to appointment {}", appointment.id);

        let note_data = json!({
            "appointment_id": appointment.id,
            "author_id": appointment.patient_id,
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
}
