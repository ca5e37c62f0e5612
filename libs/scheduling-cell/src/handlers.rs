use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    BlockDatesRequest, BlockSlotRequest, ConfirmBookingRequest, MonthWindow, ReplaceDayRulesRequest,
    RescheduleRequest,
};
use crate::services::{
    availability::AvailabilityService,
    booking::BookingService,
    clock::{Clock, SystemClock},
    exceptions::DateBlockService,
    slots::SlotService,
    supabase_store::SupabaseScheduleStore,
    time_grid::parse_time_input,
};
use crate::settings::ScheduleSettings;

type BearerAuth = Option<TypedHeader<Authorization<Bearer>>>;

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    /// Any date inside the wanted month; defaults to the current one.
    pub month: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// Per-request wiring: the caller's token goes to the store as is.
struct RequestContext {
    store: Arc<SupabaseScheduleStore>,
    settings: ScheduleSettings,
    clock: Arc<dyn Clock>,
}

impl RequestContext {
    fn new(state: &AppConfig, auth: BearerAuth) -> Result<Self, AppError> {
        let token = auth.map(|TypedHeader(auth)| auth.token().to_string());
        let settings = ScheduleSettings::from_config(state)
            .map_err(|e| AppError::Internal(format!("Invalid schedule settings: {}", e)))?;

        Ok(Self {
            store: Arc::new(SupabaseScheduleStore::new(state).with_auth_token(token)),
            settings,
            clock: Arc::new(SystemClock),
        })
    }

    fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(self.store.clone())
    }

    fn blocks(&self) -> DateBlockService {
        DateBlockService::new(self.store.clone(), self.clock.clone(), self.settings)
    }

    fn bookings(&self) -> BookingService {
        BookingService::new(self.store.clone(), self.settings)
    }

    fn slots(&self) -> SlotService {
        SlotService::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.settings,
        )
    }
}

// ==============================================================================
// WEEKLY RULES
// ==============================================================================

#[axum::debug_handler]
pub async fn get_rules(
    State(state): State<Arc<AppConfig>>,
    Path(professional_id): Path<Uuid>,
    auth: BearerAuth,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let rules = ctx.availability().list_rules(professional_id).await?;

    Ok(Json(json!({
        "rules": rules,
        "total": rules.len()
    })))
}

#[axum::debug_handler]
pub async fn replace_day_rules(
    State(state): State<Arc<AppConfig>>,
    Path((professional_id, day_of_week)): Path<(Uuid, i32)>,
    auth: BearerAuth,
    Json(request): Json<ReplaceDayRulesRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let service = ctx.availability();

    let saved = service
        .replace_day_rules(professional_id, day_of_week, request.rules)
        .await?;
    // Read back so the caller sees exactly what is stored
    let rules = match service.stored_rules_for_day(professional_id, day_of_week).await {
        Ok(rules) => rules,
        Err(e) => {
            warn!("Re-read of weekday {} failed after save, returning write result: {}", day_of_week, e);
            saved
        }
    };

    Ok(Json(json!({
        "day_of_week": day_of_week,
        "rules": rules
    })))
}

// ==============================================================================
// DATE EXCEPTIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_exceptions(
    State(state): State<Arc<AppConfig>>,
    Path(professional_id): Path<Uuid>,
    Query(query): Query<MonthQuery>,
    auth: BearerAuth,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let anchor = query
        .month
        .unwrap_or_else(|| ctx.settings.local_date(ctx.clock.now()));
    let month = MonthWindow::containing(anchor);

    let exceptions = ctx.blocks().list_exceptions(professional_id, month).await?;

    Ok(Json(json!({
        "month": month,
        "exceptions": exceptions
    })))
}

#[axum::debug_handler]
pub async fn block_dates(
    State(state): State<Arc<AppConfig>>,
    Path(professional_id): Path<Uuid>,
    auth: BearerAuth,
    Json(request): Json<BlockDatesRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let dates: BTreeSet<NaiveDate> = request.dates.into_iter().collect();

    let created = ctx
        .blocks()
        .block_dates(professional_id, &dates, request.kind, request.note)
        .await?;

    Ok(Json(json!({ "created": created })))
}

#[axum::debug_handler]
pub async fn block_slot(
    State(state): State<Arc<AppConfig>>,
    Path(professional_id): Path<Uuid>,
    auth: BearerAuth,
    Json(request): Json<BlockSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let time = parse_time_input(&request.time)?;

    let exception = ctx
        .blocks()
        .block_single_slot(professional_id, request.date, time)
        .await?;

    Ok(Json(json!(exception)))
}

#[axum::debug_handler]
pub async fn unblock(
    State(state): State<Arc<AppConfig>>,
    Path((professional_id, exception_id)): Path<(Uuid, Uuid)>,
    auth: BearerAuth,
) -> Result<Json<Value>, AppError> {
    debug!("Unblocking exception {} of professional {}", exception_id, professional_id);
    let ctx = RequestContext::new(&state, auth)?;
    ctx.blocks().unblock_date(professional_id, exception_id).await?;

    Ok(Json(json!({ "removed": exception_id })))
}

// ==============================================================================
// SLOTS AND APPOINTMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_day_slots(
    State(state): State<Arc<AppConfig>>,
    Path(professional_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    auth: BearerAuth,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let day = ctx.slots().day_slots(professional_id, query.date).await?;

    Ok(Json(json!({
        "date": query.date,
        "schedule": day
    })))
}

#[axum::debug_handler]
pub async fn confirm_booking(
    State(state): State<Arc<AppConfig>>,
    Path(professional_id): Path<Uuid>,
    auth: BearerAuth,
    Json(request): Json<ConfirmBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let appointment = ctx.bookings().confirm_booking(professional_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    auth: BearerAuth,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(&state, auth)?;
    let appointment = ctx
        .bookings()
        .reschedule(appointment_id, request.delta_minutes)
        .await?;

    Ok(Json(json!(appointment)))
}
