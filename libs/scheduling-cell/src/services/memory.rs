use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    Appointment, AvailabilityRule, DateException, NewAppointment, NewDateException, RuleInterval,
};
use crate::services::store::{AvailabilityRuleStore, BookingStore, DateExceptionStore};

/// Process-local store with the same constraints as the database schema:
/// unique rule start per weekday, and no overlap between confirmed/blocked
/// appointments of one professional.
#[derive(Default)]
pub struct MemoryScheduleStore {
    rules: RwLock<Vec<AvailabilityRule>>,
    exceptions: RwLock<HashMap<Uuid, DateException>>,
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    offline: AtomicBool,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with a transient error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), ScheduleError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ScheduleError::TransientIo("memory store is offline".to_string()));
        }
        Ok(())
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.appointments.read().await.values().cloned().collect()
    }

    fn check_exclusion(
        appointments: &HashMap<Uuid, Appointment>,
        candidate: &Appointment,
    ) -> Result<(), ScheduleError> {
        if !candidate.status.occupies_time() {
            return Ok(());
        }
        let clash = appointments.values().any(|existing| {
            existing.id != candidate.id
                && existing.professional_id == candidate.professional_id
                && existing.status.occupies_time()
                && existing.overlaps(candidate.start_at, candidate.end_at)
        });
        if clash {
            return Err(ScheduleError::ConstraintViolation(
                "appointments_no_overlap".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityRuleStore for MemoryScheduleStore {
    async fn list_rules(&self, professional_id: Uuid) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        self.ensure_online()?;
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|rule| rule.professional_id == professional_id)
            .cloned()
            .collect())
    }

    async fn replace_day_rules(
        &self,
        professional_id: Uuid,
        day_of_week: i32,
        rules: Vec<RuleInterval>,
    ) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        self.ensure_online()?;

        for (index, rule) in rules.iter().enumerate() {
            if rules[..index].iter().any(|earlier| earlier.start_time == rule.start_time) {
                return Err(ScheduleError::ConstraintViolation(
                    "availability_rules_day_start_key".to_string(),
                ));
            }
        }

        let replacement: Vec<AvailabilityRule> = rules
            .into_iter()
            .map(|interval| AvailabilityRule {
                id: Some(Uuid::new_v4()),
                professional_id,
                day_of_week,
                start_time: interval.start_time,
                end_time: interval.end_time,
                active: interval.active,
            })
            .collect();

        // Single write guard: readers never see the day emptied
        let mut stored = self.rules.write().await;
        stored.retain(|rule| !(rule.professional_id == professional_id && rule.day_of_week == day_of_week));
        stored.extend(replacement.iter().cloned());

        Ok(replacement)
    }
}

#[async_trait]
impl DateExceptionStore for MemoryScheduleStore {
    async fn list_exceptions(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateException>, ScheduleError> {
        self.ensure_online()?;
        let mut found: Vec<DateException> = self
            .exceptions
            .read()
            .await
            .values()
            .filter(|e| e.professional_id == professional_id && e.start_at >= from && e.start_at < to)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start_at);
        Ok(found)
    }

    async fn insert_exceptions(
        &self,
        exceptions: Vec<NewDateException>,
    ) -> Result<Vec<DateException>, ScheduleError> {
        self.ensure_online()?;

        let created: Vec<DateException> = exceptions
            .into_iter()
            .map(|new| DateException {
                id: Uuid::new_v4(),
                professional_id: new.professional_id,
                start_at: new.start_at,
                end_at: new.end_at,
                kind: new.kind,
                note: new.note,
            })
            .collect();

        let mut stored = self.exceptions.write().await;
        for exception in &created {
            stored.insert(exception.id, exception.clone());
        }
        Ok(created)
    }

    async fn delete_exception(&self, professional_id: Uuid, exception_id: Uuid) -> Result<(), ScheduleError> {
        self.ensure_online()?;
        let mut stored = self.exceptions.write().await;
        let owned = stored
            .get(&exception_id)
            .is_some_and(|existing| existing.professional_id == professional_id);
        if !owned {
            return Err(ScheduleError::NotFound(format!("Date exception {}", exception_id)));
        }
        stored.remove(&exception_id);
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryScheduleStore {
    async fn list_bookings(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, ScheduleError> {
        self.ensure_online()?;
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| {
                a.professional_id == professional_id && a.status.occupies_time() && a.overlaps(from, to)
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| a.start_at);
        Ok(found)
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, ScheduleError> {
        self.ensure_online()?;
        self.appointments
            .read()
            .await
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(format!("Appointment {}", appointment_id)))
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, ScheduleError> {
        self.ensure_online()?;
        let created = Appointment {
            id: Uuid::new_v4(),
            professional_id: appointment.professional_id,
            patient_id: appointment.patient_id,
            start_at: appointment.start_at,
            end_at: appointment.end_at,
            status: appointment.status,
            note: appointment.note,
        };

        let mut stored = self.appointments.write().await;
        Self::check_exclusion(&stored, &created)?;
        stored.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_appointment_times(
        &self,
        appointment_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Appointment, ScheduleError> {
        self.ensure_online()?;
        let mut stored = self.appointments.write().await;
        let mut moved = stored
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(format!("Appointment {}", appointment_id)))?;
        moved.start_at = start_at;
        moved.end_at = end_at;

        Self::check_exclusion(&stored, &moved)?;
        stored.insert(appointment_id, moved.clone());
        Ok(moved)
    }
}
