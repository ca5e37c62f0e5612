use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::error::ScheduleError;
use crate::models::{
    Appointment, AppointmentStatus, AvailabilityRule, DateException, ExceptionKind,
    NewAppointment, NewDateException, RuleInterval,
};
use crate::services::store::{AvailabilityRuleStore, BookingStore, DateExceptionStore};

const RULES_TABLE: &str = "/rest/v1/availability_rules";
const EXCEPTIONS_TABLE: &str = "/rest/v1/date_exceptions";
const APPOINTMENTS_TABLE: &str = "/rest/v1/appointments";
const REPLACE_DAY_FUNCTION: &str = "replace_day_availability";

/// Note older clients wrote on manual slot blocks before `kind` existed.
pub const LEGACY_MANUAL_BLOCK_NOTE: &str = "manual_slot_block";

/// PostgREST-backed implementation of all three stores.
#[derive(Clone)]
pub struct SupabaseScheduleStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            auth_token: None,
        }
    }

    /// Forward the caller's bearer token so row level security applies.
    pub fn with_auth_token(mut self, auth_token: Option<String>) -> Self {
        self.auth_token = auth_token;
        self
    }

    fn token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn time_of_day(time: chrono::NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn decode_rows<T>(rows: Vec<Value>) -> Result<Vec<T>, ScheduleError>
where
    T: serde::de::DeserializeOwned,
{
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| ScheduleError::StoreRejected(format!("Failed to parse rows: {}", e)))
}

fn first_row<T>(rows: Vec<Value>, what: &str) -> Result<T, ScheduleError>
where
    T: serde::de::DeserializeOwned,
{
    decode_rows::<T>(rows)?
        .into_iter()
        .next()
        .ok_or_else(|| ScheduleError::NotFound(what.to_string()))
}

#[derive(Debug, Deserialize)]
struct DateExceptionRow {
    id: Uuid,
    professional_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    #[serde(default)]
    kind: Option<ExceptionKind>,
    #[serde(default)]
    note: Option<String>,
}

impl From<DateExceptionRow> for DateException {
    fn from(row: DateExceptionRow) -> Self {
        let kind = row.kind.unwrap_or_else(|| {
            if row.note.as_deref() == Some(LEGACY_MANUAL_BLOCK_NOTE) {
                ExceptionKind::ManualSlot
            } else {
                ExceptionKind::FullDay
            }
        });

        DateException {
            id: row.id,
            professional_id: row.professional_id,
            start_at: row.start_at,
            end_at: row.end_at,
            kind,
            note: row.note,
        }
    }
}

#[async_trait]
impl AvailabilityRuleStore for SupabaseScheduleStore {
    async fn list_rules(&self, professional_id: Uuid) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        debug!("Fetching availability rules for professional: {}", professional_id);

        let path = format!(
            "{}?professional_id=eq.{}&order=day_of_week.asc,start_time.asc",
            RULES_TABLE, professional_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.token(),
            None,
        ).await?;

        decode_rows(result)
    }

    async fn replace_day_rules(
        &self,
        professional_id: Uuid,
        day_of_week: i32,
        rules: Vec<RuleInterval>,
    ) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        debug!(
            "Replacing {} rules for professional {} on day {}",
            rules.len(), professional_id, day_of_week
        );

        let payload: Vec<Value> = rules
            .iter()
            .map(|rule| json!({
                "start_time": time_of_day(rule.start_time),
                "end_time": time_of_day(rule.end_time),
                "active": rule.active
            }))
            .collect();

        let result: Vec<Value> = self.supabase.rpc(
            REPLACE_DAY_FUNCTION,
            self.token(),
            json!({
                "p_professional_id": professional_id,
                "p_day_of_week": day_of_week,
                "p_rules": payload
            }),
        ).await?;

        let saved: Vec<AvailabilityRule> = decode_rows(result)?;
        info!("Saved {} rules for professional {} on day {}", saved.len(), professional_id, day_of_week);
        Ok(saved)
    }
}

#[async_trait]
impl DateExceptionStore for SupabaseScheduleStore {
    async fn list_exceptions(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateException>, ScheduleError> {
        debug!("Fetching exceptions for professional {} from {} to {}", professional_id, from, to);

        let path = format!(
            "{}?professional_id=eq.{}&start_at=gte.{}&start_at=lt.{}&order=start_at.asc",
            EXCEPTIONS_TABLE,
            professional_id,
            timestamp(from),
            timestamp(to)
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.token(),
            None,
        ).await?;

        let rows: Vec<DateExceptionRow> = decode_rows(result)?;
        Ok(rows.into_iter().map(DateException::from).collect())
    }

    async fn insert_exceptions(
        &self,
        exceptions: Vec<NewDateException>,
    ) -> Result<Vec<DateException>, ScheduleError> {
        debug!("Inserting {} date exceptions", exceptions.len());

        let body = serde_json::to_value(&exceptions)
            .map_err(|e| ScheduleError::validation(format!("Unserializable exception batch: {}", e)))?;

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            EXCEPTIONS_TABLE,
            self.token(),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let rows: Vec<DateExceptionRow> = decode_rows(result)?;
        Ok(rows.into_iter().map(DateException::from).collect())
    }

    async fn delete_exception(&self, professional_id: Uuid, exception_id: Uuid) -> Result<(), ScheduleError> {
        debug!("Deleting date exception {} of professional {}", exception_id, professional_id);

        let path = format!(
            "{}?id=eq.{}&professional_id=eq.{}",
            EXCEPTIONS_TABLE, exception_id, professional_id
        );
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            self.token(),
            None,
            Some(SupabaseClient::representation_headers()),
        ).await?;

        if deleted.is_empty() {
            return Err(ScheduleError::NotFound(format!("Date exception {}", exception_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for SupabaseScheduleStore {
    async fn list_bookings(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, ScheduleError> {
        debug!("Fetching bookings for professional {} from {} to {}", professional_id, from, to);

        let statuses: Vec<&str> = AppointmentStatus::OCCUPYING.iter().map(|s| s.as_str()).collect();
        let path = format!(
            "{}?professional_id=eq.{}&status=in.({})&start_at=lt.{}&end_at=gt.{}&order=start_at.asc",
            APPOINTMENTS_TABLE,
            professional_id,
            statuses.join(","),
            timestamp(to),
            timestamp(from)
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.token(),
            None,
        ).await?;

        decode_rows(result)
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, ScheduleError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("{}?id=eq.{}", APPOINTMENTS_TABLE, appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.token(),
            None,
        ).await?;

        first_row(result, &format!("Appointment {}", appointment_id))
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, ScheduleError> {
        debug!("Inserting appointment for professional {}", appointment.professional_id);

        let body = serde_json::to_value(&appointment)
            .map_err(|e| ScheduleError::validation(format!("Unserializable appointment: {}", e)))?;

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            APPOINTMENTS_TABLE,
            self.token(),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        first_row(result, "Created appointment")
    }

    async fn update_appointment_times(
        &self,
        appointment_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Appointment, ScheduleError> {
        debug!("Moving appointment {} to {} - {}", appointment_id, start_at, end_at);

        let path = format!("{}?id=eq.{}", APPOINTMENTS_TABLE, appointment_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            self.token(),
            Some(json!({
                "start_at": timestamp(start_at),
                "end_at": timestamp(end_at)
            })),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        first_row(result, &format!("Appointment {}", appointment_id))
    }
}
