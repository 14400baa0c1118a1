use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Points the config at a wiremock server standing in for the data API.
    pub fn with_storage_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn center(email: &str) -> Self {
        Self::new(email, "center")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for the scheduling tables. Tests tweak fields
/// through `Value` indexing where a case needs something specific.
pub struct MockStorageResponses;

impl MockStorageResponses {
    pub fn weekly_schedule_row(
        provider_id: &str,
        service_id: &str,
        day_of_week: u8,
        start_time: &str,
        end_time: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "service_id": service_id,
            "day_of_week": day_of_week,
            "is_available": true,
            "start_time": start_time,
            "end_time": end_time,
            "break_start": null,
            "break_end": null,
            "slot_minutes": 30,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn schedule_override_row(
        provider_id: &str,
        service_id: &str,
        override_date: &str,
        is_available: bool,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "service_id": service_id,
            "override_date": override_date,
            "is_available": is_available,
            "start_time": if is_available { json!("09:00:00") } else { json!(null) },
            "end_time": if is_available { json!("12:00:00") } else { json!(null) },
            "break_start": null,
            "break_end": null,
            "slot_minutes": if is_available { 30 } else { 0 },
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        provider_id: &str,
        service_id: &str,
        patient_id: &str,
        appointment_date: &str,
        start_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "service_id": service_id,
            "patient_id": patient_id,
            "appointment_date": appointment_date,
            "start_time": start_time,
            "duration_minutes": 30,
            "status": status,
            "fee": null,
            "cancellation_reason": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_note_row(appointment_id: &str, author_id: &str, body: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "author_id": author_id,
            "body": body,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn consultation_record_row(
        appointment_id: &str,
        provider_id: &str,
        patient_id: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "provider_id": provider_id,
            "patient_id": patient_id,
            "diagnosis": "Seasonal allergies",
            "treatment": "Antihistamine course",
            "prescription": null,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    /// Body PostgREST returns when the partial unique index on
    /// appointments rejects an insert.
    pub fn unique_violation() -> Value {
        json!({
            "code": "23505",
            "details": "Key (provider_id, service_id, appointment_date, start_time) already exists.",
            "hint": null,
            "message": "duplicate key value violates unique constraint \"appointments_active_slot_key\""
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::center("clinic@example.com");
        assert_eq!(user.email, "clinic@example.com");
        assert_eq!(user.role, "center");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert!(token.contains('.'));
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn schedule_row_shape() {
        let row = MockStorageResponses::weekly_schedule_row(
            "p-1", "s-1", 1, "09:00:00", "17:00:00",
        );
        assert_eq!(row["day_of_week"], 1);
        assert_eq!(row["is_available"], true);
        assert_eq!(row["slot_minutes"], 30);
    }
}
