use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

use shared_config::AppConfig;

use crate::error::ScheduleError;
use crate::services::time_grid::{self, TimeGrid, GRID_STEP_MINUTES};

/// Span of the day over which slots are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub step_minutes: u32,
}

impl ServiceWindow {
    /// Rules and manual blocks always land on the 15-minute grid, so the
    /// window must use that step and start and end on it.
    pub fn new(start: NaiveTime, end: NaiveTime, step_minutes: u32) -> Result<Self, ScheduleError> {
        if step_minutes != GRID_STEP_MINUTES {
            return Err(ScheduleError::validation(format!(
                "Slot step must be {} minutes, got {}",
                GRID_STEP_MINUTES, step_minutes
            )));
        }
        if let Some(off) = [start, end].into_iter().find(|t| !time_grid::is_on_grid(*t)) {
            return Err(ScheduleError::validation(format!(
                "Service window bound {} is not on the {}-minute grid",
                off.format("%H:%M"),
                GRID_STEP_MINUTES
            )));
        }
        // Validates the bounds the same way the grid will
        TimeGrid::new(start, end, step_minutes)?;
        Ok(Self { start, end, step_minutes })
    }

    pub fn grid(&self) -> Result<TimeGrid, ScheduleError> {
        TimeGrid::new(self.start, self.end, self.step_minutes)
    }
}

impl Default for ServiceWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            step_minutes: GRID_STEP_MINUTES,
        }
    }
}

/// Calendar settings for one deployment: the local offset that turns a
/// date plus time-of-day into an instant, and the slot window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub offset: FixedOffset,
    pub window: ServiceWindow,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            window: ServiceWindow::default(),
        }
    }
}

impl ScheduleSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ScheduleError> {
        let offset = FixedOffset::east_opt(config.schedule_utc_offset_minutes * 60)
            .ok_or_else(|| ScheduleError::validation(format!(
                "UTC offset of {} minutes is out of range",
                config.schedule_utc_offset_minutes
            )))?;
        let start = time_grid::parse_time_input(&config.service_day_start)?;
        let end = time_grid::parse_time_input(&config.service_day_end)?;
        let window = ServiceWindow::new(start, end, config.slot_step_minutes)?;

        Ok(Self { offset, window })
    }

    /// Local wall-clock `date time` as a UTC instant.
    pub fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let shift = Duration::seconds(self.offset.local_minus_utc() as i64);
        (date.and_time(time) - shift).and_utc()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.offset).time()
    }

    /// `[00:00, next 00:00)` of a local date.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.local_instant(date, NaiveTime::MIN);
        (start, start + Duration::days(1))
    }

    /// Span stored for a full-day block: start of day to 23:59:59.
    pub fn full_day_span(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let (start, next) = self.day_bounds(date);
        (start, next - Duration::seconds(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn from_config_reads_window_and_offset() {
        let config = AppConfig {
            schedule_utc_offset_minutes: -180,
            service_day_start: "07:00".to_string(),
            service_day_end: "19:30".to_string(),
            ..AppConfig::default()
        };
        let settings = ScheduleSettings::from_config(&config).unwrap();
        assert_eq!(settings.offset.local_minus_utc(), -180 * 60);
        assert_eq!(settings.window.start, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(settings.window.end, NaiveTime::from_hms_opt(19, 30, 0).unwrap());
    }

    #[test]
    fn from_config_rejects_inverted_window() {
        let config = AppConfig {
            service_day_start: "20:00".to_string(),
            service_day_end: "08:00".to_string(),
            ..AppConfig::default()
        };
        assert_matches!(ScheduleSettings::from_config(&config), Err(ScheduleError::Validation(_)));
    }

    #[test]
    fn from_config_rejects_steps_off_the_grid() {
        for step in [20, 30, 5] {
            let config = AppConfig {
                slot_step_minutes: step,
                ..AppConfig::default()
            };
            assert_matches!(ScheduleSettings::from_config(&config), Err(ScheduleError::Validation(_)));
        }
    }

    #[test]
    fn window_bounds_must_sit_on_the_grid() {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_matches!(ServiceWindow::new(at(8, 10), at(20, 0), 15), Err(ScheduleError::Validation(_)));
        assert!(ServiceWindow::new(at(7, 45), at(19, 15), 15).is_ok());
    }

    #[test]
    fn local_instant_applies_offset() {
        let settings = ScheduleSettings {
            offset: FixedOffset::west_opt(3 * 3600).unwrap(),
            ..ScheduleSettings::default()
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let instant = settings.local_instant(date, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(instant.to_rfc3339(), "2025-03-10T12:00:00+00:00");
        assert_eq!(settings.local_date(instant), date);
    }
}
