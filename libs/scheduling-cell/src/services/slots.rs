use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    day_of_week, Appointment, AvailabilityRule, DateException, DaySlots, ExceptionKind, Slot, SlotState,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::BookingService;
use crate::services::clock::Clock;
use crate::services::exceptions::DateBlockService;
use crate::services::store::{AvailabilityRuleStore, BookingStore, DateExceptionStore};
use crate::services::time_grid::minute_of_day;
use crate::settings::ScheduleSettings;

/// Rules are matched this many minutes ahead of their start.
const RULE_START_TOLERANCE_MINUTES: u32 = 1;

/// Decide the state of every grid point of `date`.
///
/// A full-day block short-circuits to [`DaySlots::DayBlocked`]. Otherwise
/// each point is judged in this order: past, booked, manually blocked,
/// covered by an active rule, outside availability.
pub fn generate_slots(
    date: NaiveDate,
    rules: &[AvailabilityRule],
    exceptions: &[DateException],
    bookings: &[Appointment],
    now: DateTime<Utc>,
    settings: &ScheduleSettings,
) -> Result<DaySlots, ScheduleError> {
    if let Some(block) = exceptions
        .iter()
        .find(|e| e.kind == ExceptionKind::FullDay && settings.local_date(e.start_at) == date)
    {
        return Ok(DaySlots::DayBlocked {
            exception_id: block.id,
            note: block.note.clone(),
        });
    }

    let weekday = day_of_week(date);
    let day_rules: Vec<&AvailabilityRule> = rules
        .iter()
        .filter(|rule| rule.active && rule.day_of_week == weekday)
        .collect();

    let slots = settings
        .window
        .grid()?
        .map(|time| {
            let instant = settings.local_instant(date, time);
            Slot {
                time,
                state: slot_state(time, instant, &day_rules, exceptions, bookings, now),
            }
        })
        .collect();

    Ok(DaySlots::Open { slots })
}

fn slot_state(
    time: NaiveTime,
    instant: DateTime<Utc>,
    day_rules: &[&AvailabilityRule],
    exceptions: &[DateException],
    bookings: &[Appointment],
    now: DateTime<Utc>,
) -> SlotState {
    if instant < now {
        return SlotState::Past;
    }

    if let Some(booking) = bookings
        .iter()
        .find(|b| b.status.occupies_time() && b.contains(instant))
    {
        return SlotState::Booked {
            appointment: booking.clone(),
        };
    }

    if let Some(block) = exceptions
        .iter()
        .find(|e| e.kind == ExceptionKind::ManualSlot && e.start_at == instant)
    {
        return SlotState::ManualBlocked {
            exception_id: block.id,
        };
    }

    if day_rules.iter().any(|rule| rule_covers(rule, time)) {
        return SlotState::Available;
    }

    SlotState::OutsideAvailability
}

fn rule_covers(rule: &AvailabilityRule, time: NaiveTime) -> bool {
    let minute = minute_of_day(time);
    minute + RULE_START_TOLERANCE_MINUTES >= minute_of_day(rule.start_time)
        && minute < minute_of_day(rule.end_time)
}

/// Pulls the three inputs for a date and runs [`generate_slots`].
pub struct SlotService {
    availability: AvailabilityService,
    blocks: DateBlockService,
    bookings: BookingService,
    clock: Arc<dyn Clock>,
    settings: ScheduleSettings,
}

impl SlotService {
    pub fn new(
        rules: Arc<dyn AvailabilityRuleStore>,
        exceptions: Arc<dyn DateExceptionStore>,
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            availability: AvailabilityService::new(rules),
            blocks: DateBlockService::new(exceptions, clock.clone(), settings),
            bookings: BookingService::new(bookings, settings),
            clock,
            settings,
        }
    }

    pub async fn day_slots(&self, professional_id: Uuid, date: NaiveDate) -> Result<DaySlots, ScheduleError> {
        debug!("Generating slots for professional {} on {}", professional_id, date);

        let rules = self.availability.list_rules(professional_id).await?;
        let exceptions = self.blocks.exceptions_on(professional_id, date).await?;
        let bookings = self.bookings.list_bookings(professional_id, date).await?;

        generate_slots(date, &rules, &exceptions, &bookings, self.clock.now(), &self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::TimeZone;

    const MONDAY: (i32, u32, u32) = (2025, 3, 10);

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(MONDAY.0, MONDAY.1, MONDAY.2).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(MONDAY.0, MONDAY.1, MONDAY.2, h, m, 0).unwrap()
    }

    fn rule(professional_id: Uuid, day: i32, start: NaiveTime, end: NaiveTime) -> AvailabilityRule {
        AvailabilityRule {
            id: Some(Uuid::new_v4()),
            professional_id,
            day_of_week: day,
            start_time: start,
            end_time: end,
            active: true,
        }
    }

    fn booking(professional_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            professional_id,
            patient_id: Some(Uuid::new_v4()),
            start_at: start,
            end_at: end,
            status,
            note: None,
        }
    }

    fn state_at(day: &DaySlots, time: NaiveTime) -> Option<&SlotState> {
        day.slots().iter().find(|s| s.time == time).map(|s| &s.state)
    }

    #[test]
    fn morning_rule_yields_available_slots_with_exclusive_end() {
        let pid = Uuid::new_v4();
        let rules = vec![rule(pid, 1, hm(8, 0), hm(12, 0))];
        let day = generate_slots(monday(), &rules, &[], &[], at(7, 0), &ScheduleSettings::default()).unwrap();

        let available: Vec<NaiveTime> = day.slots().iter().filter(|s| s.is_available()).map(|s| s.time).collect();
        assert_eq!(available.len(), 16);
        assert_eq!(available.first(), Some(&hm(8, 0)));
        assert_eq!(available.last(), Some(&hm(11, 45)));
        assert_eq!(state_at(&day, hm(12, 0)), Some(&SlotState::OutsideAvailability));
    }

    #[test]
    fn booking_wins_over_rule_and_manual_block() {
        let pid = Uuid::new_v4();
        let rules = vec![rule(pid, 1, hm(8, 0), hm(12, 0))];
        let appt = booking(pid, at(9, 0), at(9, 15), AppointmentStatus::Confirmed);
        let manual = DateException {
            id: Uuid::new_v4(),
            professional_id: pid,
            start_at: at(9, 0),
            end_at: at(9, 15),
            kind: ExceptionKind::ManualSlot,
            note: None,
        };

        let day = generate_slots(
            monday(),
            &rules,
            &[manual],
            &[appt.clone()],
            at(7, 0),
            &ScheduleSettings::default(),
        )
        .unwrap();

        assert_eq!(state_at(&day, hm(9, 0)), Some(&SlotState::Booked { appointment: appt }));
        assert_eq!(state_at(&day, hm(8, 45)), Some(&SlotState::Available));
        assert_eq!(state_at(&day, hm(9, 15)), Some(&SlotState::Available));
    }

    #[test]
    fn cancelled_and_pending_bookings_do_not_occupy() {
        let pid = Uuid::new_v4();
        let rules = vec![rule(pid, 1, hm(8, 0), hm(12, 0))];
        let bookings = vec![
            booking(pid, at(9, 0), at(9, 15), AppointmentStatus::Cancelled),
            booking(pid, at(10, 0), at(10, 15), AppointmentStatus::Pending),
        ];
        let day = generate_slots(monday(), &rules, &[], &bookings, at(7, 0), &ScheduleSettings::default()).unwrap();
        assert_eq!(state_at(&day, hm(9, 0)), Some(&SlotState::Available));
        assert_eq!(state_at(&day, hm(10, 0)), Some(&SlotState::Available));
    }

    #[test]
    fn past_is_checked_before_anything_else() {
        let pid = Uuid::new_v4();
        let rules = vec![rule(pid, 1, hm(8, 0), hm(12, 0))];
        let appt = booking(pid, at(9, 0), at(10, 0), AppointmentStatus::Confirmed);
        let day = generate_slots(monday(), &rules, &[], &[appt.clone()], at(9, 30), &ScheduleSettings::default()).unwrap();

        assert_eq!(state_at(&day, hm(9, 15)), Some(&SlotState::Past));
        assert_eq!(state_at(&day, hm(9, 30)), Some(&SlotState::Booked { appointment: appt }));
        assert_eq!(state_at(&day, hm(10, 0)), Some(&SlotState::Available));
    }

    #[test]
    fn full_day_block_short_circuits() {
        let pid = Uuid::new_v4();
        let rules = vec![rule(pid, 1, hm(8, 0), hm(12, 0))];
        let block = DateException {
            id: Uuid::new_v4(),
            professional_id: pid,
            start_at: at(0, 0),
            end_at: at(23, 59),
            kind: ExceptionKind::FullDay,
            note: Some("holiday".to_string()),
        };
        let appt = booking(pid, at(9, 0), at(9, 15), AppointmentStatus::Confirmed);

        let day = generate_slots(monday(), &rules, &[block.clone()], &[appt], at(7, 0), &ScheduleSettings::default()).unwrap();
        assert_eq!(day, DaySlots::DayBlocked { exception_id: block.id, note: Some("holiday".to_string()) });
        assert!(day.slots().is_empty());
    }

    #[test]
    fn rule_starting_one_minute_late_still_covers_its_grid_point() {
        let pid = Uuid::new_v4();
        let rules = vec![rule(pid, 1, hm(8, 1), hm(9, 0))];
        let day = generate_slots(monday(), &rules, &[], &[], at(7, 0), &ScheduleSettings::default()).unwrap();
        assert_eq!(state_at(&day, hm(8, 0)), Some(&SlotState::Available));
    }

    #[test]
    fn inactive_and_other_weekday_rules_are_ignored() {
        let pid = Uuid::new_v4();
        let mut inactive = rule(pid, 1, hm(8, 0), hm(12, 0));
        inactive.active = false;
        let tuesday = rule(pid, 2, hm(8, 0), hm(12, 0));
        let day = generate_slots(monday(), &[inactive, tuesday], &[], &[], at(7, 0), &ScheduleSettings::default()).unwrap();
        assert!(day.slots().iter().all(|s| s.state == SlotState::OutsideAvailability));
    }

    #[test]
    fn no_inputs_is_not_an_error() {
        let day = generate_slots(monday(), &[], &[], &[], at(7, 0), &ScheduleSettings::default()).unwrap();
        assert_eq!(day.slots().len(), 48);
        assert_eq!(day.slots().first().map(|s| s.time), Some(hm(8, 0)));
        assert_eq!(day.slots().last().map(|s| s.time), Some(hm(19, 45)));
    }
}
