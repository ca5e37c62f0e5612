use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{Appointment, AppointmentStatus, ConfirmBookingRequest, NewAppointment};
use crate::services::store::BookingStore;
use crate::settings::ScheduleSettings;

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    settings: ScheduleSettings,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, settings: ScheduleSettings) -> Self {
        Self { store, settings }
    }

    /// Confirmed and blocked appointments touching a local date.
    pub async fn list_bookings(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, ScheduleError> {
        let (from, to) = self.settings.day_bounds(date);
        self.store.list_bookings(professional_id, from, to).await
    }

    /// Write a confirmed appointment coming out of checkout.
    pub async fn confirm_booking(
        &self,
        professional_id: Uuid,
        request: ConfirmBookingRequest,
    ) -> Result<Appointment, ScheduleError> {
        debug!("Confirming booking for professional {} at {}", professional_id, request.start_at);

        if request.end_at <= request.start_at {
            return Err(ScheduleError::validation("Appointment must end after it starts"));
        }

        self.ensure_free(professional_id, request.start_at, request.end_at, None).await?;

        let appointment = self
            .store
            .insert_appointment(NewAppointment {
                professional_id,
                patient_id: request.patient_id,
                start_at: request.start_at,
                end_at: request.end_at,
                status: AppointmentStatus::Confirmed,
                note: request.note,
            })
            .await
            .map_err(taken_meanwhile)?;

        info!("Appointment {} confirmed for professional {}", appointment.id, professional_id);
        Ok(appointment)
    }

    /// Shift an appointment by `delta_minutes`, keeping its length. The
    /// shifted interval must not overlap another confirmed or blocked
    /// appointment of the same professional.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        delta_minutes: i64,
    ) -> Result<Appointment, ScheduleError> {
        let current = self.store.get_appointment(appointment_id).await?;
        if delta_minutes == 0 {
            return Ok(current);
        }

        let delta = Duration::minutes(delta_minutes);
        let start_at = current.start_at + delta;
        let end_at = current.end_at + delta;
        debug!("Rescheduling appointment {} by {} minutes", appointment_id, delta_minutes);

        if current.status.occupies_time() {
            self.ensure_free(current.professional_id, start_at, end_at, Some(appointment_id)).await?;
        }

        let moved = self
            .store
            .update_appointment_times(appointment_id, start_at, end_at)
            .await
            .map_err(taken_meanwhile)?;

        info!("Appointment {} moved to {}", appointment_id, moved.start_at);
        Ok(moved)
    }

    async fn ensure_free(
        &self,
        professional_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        ignore: Option<Uuid>,
    ) -> Result<(), ScheduleError> {
        let clashes: Vec<Appointment> = self
            .store
            .list_bookings(professional_id, start_at, end_at)
            .await?
            .into_iter()
            .filter(|existing| Some(existing.id) != ignore && existing.overlaps(start_at, end_at))
            .collect();

        if let Some(clash) = clashes.first() {
            warn!(
                "Requested {} - {} overlaps appointment {} for professional {}",
                start_at, end_at, clash.id, professional_id
            );
            return Err(ScheduleError::Conflict(format!(
                "The requested time overlaps an existing appointment ({} - {})",
                clash.start_at.format("%H:%M"),
                clash.end_at.format("%H:%M")
            )));
        }
        Ok(())
    }
}

/// The exclusion constraint fired between our check and the write.
fn taken_meanwhile(err: ScheduleError) -> ScheduleError {
    match err {
        ScheduleError::ConstraintViolation(_) => {
            ScheduleError::Conflict("The requested time was just taken".to_string())
        }
        other => other,
    }
}
