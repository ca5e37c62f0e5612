//! Persistence seams of the scheduling engine.
//!
//! Each store is a narrow async interface over the remote table service.
//! Implementations must surface a unique/overlap rejection as
//! [`ScheduleError::ConstraintViolation`] and a missing row on delete as
//! [`ScheduleError::NotFound`]. Only an unreachable or overloaded store is
//! [`ScheduleError::TransientIo`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    Appointment, AvailabilityRule, DateException, NewAppointment, NewDateException, RuleInterval,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityRuleStore: Send + Sync {
    /// Every rule of the professional, in no particular order.
    async fn list_rules(&self, professional_id: Uuid) -> Result<Vec<AvailabilityRule>, ScheduleError>;

    /// Delete every rule for `(professional_id, day_of_week)` and insert
    /// `rules` in its place as one atomic step. Other weekdays are untouched.
    async fn replace_day_rules(
        &self,
        professional_id: Uuid,
        day_of_week: i32,
        rules: Vec<RuleInterval>,
    ) -> Result<Vec<AvailabilityRule>, ScheduleError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DateExceptionStore: Send + Sync {
    /// Exceptions whose start falls in `[from, to)`.
    async fn list_exceptions(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateException>, ScheduleError>;

    /// All-or-nothing batch insert.
    async fn insert_exceptions(
        &self,
        exceptions: Vec<NewDateException>,
    ) -> Result<Vec<DateException>, ScheduleError>;

    /// Delete one exception of `professional_id`. Another professional's
    /// exception is left alone and reported as not found.
    async fn delete_exception(&self, professional_id: Uuid, exception_id: Uuid) -> Result<(), ScheduleError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Confirmed and blocked appointments overlapping `[from, to)`.
    async fn list_bookings(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, ScheduleError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, ScheduleError>;

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, ScheduleError>;

    async fn update_appointment_times(
        &self,
        appointment_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Appointment, ScheduleError>;
}
