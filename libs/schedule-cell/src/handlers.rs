// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use serde::Deserialize;
use chrono::NaiveDate;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateOverrideRequest, ReplaceWeekRequest, ScheduleError, SwitchServiceRequest,
};
use crate::services::{
    availability::AvailabilityService,
    overrides::OverrideService,
    week::ScheduleService,
};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

/// Patients browse open slots before they sign in, so resolution is public.
#[axum::debug_handler]
pub async fn get_available_slots_public(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(String, String)>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let slots = availability_service.resolve(&provider_id, &service_id, query.date, None).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "service_id": service_id,
        "date": query.date,
        "available_slots": slots,
        "total_slots": slots.len()
    })))
}

// ==============================================================================
// WEEKLY SCHEDULE HANDLERS (Provider Configuration)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_week(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(String, String)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() && user.id != provider_id {
        return Err(AppError::Forbidden("Not authorized to view this schedule".to_string()));
    }

    let schedule_service = ScheduleService::new(&state);

    let week = schedule_service.get_week(&provider_id, &service_id, Some(token)).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "service_id": service_id,
        "week": week
    })))
}

#[axum::debug_handler]
pub async fn replace_week(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(String, String)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReplaceWeekRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    ensure_schedule_editor(&user, &provider_id)?;

    let schedule_service = ScheduleService::new(&state);

    let week = schedule_service.replace_week(&provider_id, &service_id, &request.days, token).await
        .map_err(|e| match e {
            ScheduleError::InvalidConfig(msg) => AppError::ValidationError(msg),
            _ => AppError::Database(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "week": week,
        "message": "Weekly schedule replaced"
    })))
}

#[axum::debug_handler]
pub async fn switch_service(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(String, String)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SwitchServiceRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    ensure_schedule_editor(&user, &provider_id)?;

    let schedule_service = ScheduleService::new(&state);

    let response = schedule_service.switch_service(&provider_id, &service_id, request, token).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "week": response.week,
        "autosave_warning": response.autosave_warning
    })))
}

// ==============================================================================
// OVERRIDE HANDLERS (Date-specific Exceptions)
// ==============================================================================

#[axum::debug_handler]
pub async fn create_override(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(String, String)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    ensure_schedule_editor(&user, &provider_id)?;

    let override_service = OverrideService::new(&state);

    let override_entry = override_service.create_override(&provider_id, &service_id, request, token).await
        .map_err(|e| match e {
            ScheduleError::InvalidConfig(msg) => AppError::ValidationError(msg),
            ScheduleError::DuplicateOverride(date) => {
                AppError::Conflict(format!("An override already exists for {}", date))
            }
            ScheduleError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "success": true,
        "override": override_entry
    })))
}

#[axum::debug_handler]
pub async fn list_overrides(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(String, String)>,
    Query(query): Query<OverrideRangeQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() && user.id != provider_id {
        return Err(AppError::Forbidden("Not authorized to view this schedule".to_string()));
    }

    let override_service = OverrideService::new(&state);

    let overrides = override_service.list_overrides(&provider_id, &service_id, query.from, query.to, token).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "overrides": overrides,
        "total": overrides.len()
    })))
}

#[axum::debug_handler]
pub async fn delete_override(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id, date)): Path<(String, String, NaiveDate)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    ensure_schedule_editor(&user, &provider_id)?;

    let override_service = OverrideService::new(&state);

    override_service.delete_override(&provider_id, &service_id, date, token).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

/// Editing a schedule takes a provider role; a patient id that matches the
/// path is not enough.
fn ensure_schedule_editor(user: &User, provider_id: &str) -> Result<(), AppError> {
    let is_owner = user.id == provider_id && user.is_provider();
    if !user.is_admin() && !is_owner {
        return Err(AppError::Forbidden("Not authorized to edit this schedule".to_string()));
    }
    Ok(())
}
