// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use chrono::Utc;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, BookAppointmentRequest,
    BookingError, CancelAppointmentRequest, TransitionRequest,
};
use crate::services::booking::BookingService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::query::AppointmentQueryService;

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Only the patient themselves or an admin can book
    let is_patient = request.patient_id.to_string() == user.id;
    if !is_patient && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to book for this patient".to_string()));
    }

    // Past dates are a caller mistake, not a booking race
    if request.appointment_date < Utc::now().date_naive() {
        return Err(AppError::ValidationError("Cannot book an appointment in the past".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service.book_appointment(request, token).await
        .map_err(|e| match e {
            BookingError::NotBookable(date) => {
                AppError::BadRequest(format!("No bookable slots on {}", date))
            }
            BookingError::InvalidSlot => {
                AppError::BadRequest("Requested time is not on the slot grid".to_string())
            }
            BookingError::SlotConflict => {
                AppError::Conflict("Slot is already booked".to_string())
            }
            _ => AppError::Database(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let query_service = AppointmentQueryService::new(&state);
    let appointment = query_service.get_appointment(&appointment_id.to_string(), token).await
        .map_err(|e| match e {
            BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Database(e.to_string()),
        })?;

    ensure_participant(&user, &appointment)?;

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(mut query): Query<AppointmentSearchQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Non-admins only ever see their own side of the ledger
    if !user.is_admin() {
        let own_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Invalid subject in token".to_string()))?;
        if user.is_provider() {
            query.provider_id = Some(own_id);
        } else {
            query.patient_id = Some(own_id);
        }
    }

    let query_service = AppointmentQueryService::new(&state);
    let appointments = query_service.search_appointments(query, token).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn transition_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    run_transition(&state, appointment_id, request, &user, token).await
}

/// Sugar for `transition(cancelled, reason)`: patients get a single obvious
/// endpoint for the one transition they may trigger.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let transition = TransitionRequest {
        new_status: AppointmentStatus::Cancelled,
        reason: Some(request.reason),
        outcome: None,
    };

    run_transition(&state, appointment_id, transition, &user, token).await
}

async fn run_transition(
    state: &Arc<AppConfig>,
    appointment_id: Uuid,
    request: TransitionRequest,
    user: &User,
    token: &str,
) -> Result<Json<Value>, AppError> {
    // The row is read once for authorization. The status change itself is
    // still the conditional write in the lifecycle service, so a racing
    // transition between this read and that write cannot slip through.
    let query_service = AppointmentQueryService::new(state);
    let current = query_service.get_appointment(&appointment_id.to_string(), token).await
        .map_err(|e| match e {
            BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Database(e.to_string()),
        })?;

    let is_provider = current.provider_id.to_string() == user.id;
    let is_patient = current.patient_id.to_string() == user.id;
    let allowed = match request.new_status {
        AppointmentStatus::Cancelled => user.is_admin() || is_provider || is_patient,
        _ => user.is_admin() || is_provider,
    };
    if !allowed {
        return Err(AppError::Forbidden("Not authorized to change this appointment".to_string()));
    }

    let lifecycle_service = AppointmentLifecycleService::new(state);
    let appointment = lifecycle_service
        .transition_appointment(&appointment_id.to_string(), request, &user.id, token)
        .await
        .map_err(|e| match e {
            BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            BookingError::AppointmentClosed(status) => {
                AppError::Gone(format!("Appointment is closed ({})", status))
            }
            BookingError::InvalidTransition { from, to } => {
                AppError::BadRequest(format!("Invalid status transition: {} -> {}", from, to))
            }
            _ => AppError::Database(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

fn ensure_participant(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    let is_provider = appointment.provider_id.to_string() == user.id;
    let is_patient = appointment.patient_id.to_string() == user.id;
    if !user.is_admin() && !is_provider && !is_patient {
        return Err(AppError::Forbidden("Not authorized to view this appointment".to_string()));
    }
    Ok(())
}
