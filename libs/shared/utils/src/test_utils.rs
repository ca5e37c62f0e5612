use std::sync::Arc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub utc_offset_minutes: i32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

impl TestConfig {
    /// Point the config at a mock PostgREST server.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            schedule_utc_offset_minutes: self.utc_offset_minutes,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Row payloads shaped the way PostgREST returns them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn availability_rule_row(
        professional_id: &str,
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
        active: bool,
    ) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "professional_id": professional_id,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "active": active
        })
    }

    pub fn date_exception_row(
        id: &str,
        professional_id: &str,
        start_at: &str,
        end_at: &str,
        kind: Option<&str>,
        note: Option<&str>,
    ) -> Value {
        let mut row = json!({
            "id": id,
            "professional_id": professional_id,
            "start_at": start_at,
            "end_at": end_at,
            "note": note
        });
        if let Some(kind) = kind {
            row["kind"] = json!(kind);
        }
        row
    }

    pub fn appointment_row(
        id: &str,
        professional_id: &str,
        start_at: &str,
        end_at: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "professional_id": professional_id,
            "patient_id": Uuid::new_v4().to_string(),
            "start_at": start_at,
            "end_at": end_at,
            "status": status,
            "note": null
        })
    }

    pub fn constraint_violation() -> Value {
        json!({
            "code": "23505",
            "details": "Key (professional_id, day_of_week, start_time) already exists.",
            "hint": null,
            "message": "duplicate key value violates unique constraint \"availability_rules_day_start_key\""
        })
    }
}
