use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};

// ==============================================================================
// AVAILABILITY RULES
// ==============================================================================

/// Recurring weekly interval. `day_of_week` runs 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub professional_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub active: bool,
}

impl AvailabilityRule {
    pub fn interval(&self) -> RuleInterval {
        RuleInterval {
            start_time: self.start_time,
            end_time: self.end_time,
            active: self.active,
        }
    }
}

/// The part of a rule the editor owns; the store fills in identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleInterval {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RuleInterval {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self { start_time, end_time, active: true }
    }

    pub fn overlaps(&self, other: &RuleInterval) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

// ==============================================================================
// DATE EXCEPTIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    #[serde(alias = "FULL_DAY_BLOCK")]
    FullDay,
    #[serde(alias = "MANUAL_SLOT_BLOCK")]
    ManualSlot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateException {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub kind: ExceptionKind,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDateException {
    pub professional_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub kind: ExceptionKind,
    pub note: Option<String>,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Blocked,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that hold a time range and fall under the non-overlap rule.
    pub const OCCUPYING: [AppointmentStatus; 2] =
        [AppointmentStatus::Confirmed, AppointmentStatus::Blocked];

    pub fn occupies_time(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Blocked => "blocked",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub note: Option<String>,
}

impl Appointment {
    /// Half-open `[start, end)` containment.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_at <= instant && instant < self.end_at
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_at < end && start < self.end_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAppointment {
    pub professional_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub note: Option<String>,
}

// ==============================================================================
// SLOTS (derived, never stored)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    Available,
    Booked { appointment: Appointment },
    ManualBlocked { exception_id: Uuid },
    Past,
    OutsideAvailability,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub time: NaiveTime,
    #[serde(flatten)]
    pub state: SlotState,
}

impl Slot {
    pub fn is_available(&self) -> bool {
        self.state == SlotState::Available
    }
}

/// Outcome of slot generation for one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaySlots {
    DayBlocked { exception_id: Uuid, note: Option<String> },
    Open { slots: Vec<Slot> },
}

impl DaySlots {
    pub fn is_blocked(&self) -> bool {
        matches!(self, DaySlots::DayBlocked { .. })
    }

    pub fn slots(&self) -> &[Slot] {
        match self {
            DaySlots::DayBlocked { .. } => &[],
            DaySlots::Open { slots } => slots,
        }
    }
}

// ==============================================================================
// CALENDAR HELPERS
// ==============================================================================

/// 0 = Sunday .. 6 = Saturday, matching the rule table.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

pub fn is_valid_day_of_week(day: i32) -> bool {
    (0..=6).contains(&day)
}

/// Inclusive first..last day of a calendar month.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthWindow {
    pub fn containing(date: NaiveDate) -> Self {
        let start = date - chrono::Duration::days(date.day0() as i64);
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ==============================================================================
// REQUEST DTOs
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceDayRulesRequest {
    pub rules: Vec<RuleInterval>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDatesRequest {
    pub dates: Vec<NaiveDate>,
    #[serde(default = "default_block_kind")]
    pub kind: ExceptionKind,
    pub note: Option<String>,
}

fn default_block_kind() -> ExceptionKind {
    ExceptionKind::FullDay
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSlotRequest {
    pub date: NaiveDate,
    /// Raw `HH:MM`; normalized onto the grid before storing.
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmBookingRequest {
    pub patient_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub delta_minutes: i64,
}
