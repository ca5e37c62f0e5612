use chrono::{NaiveTime, Timelike};

use crate::error::ScheduleError;

/// Width of one grid unit; also the length of a manual slot block.
pub const GRID_STEP_MINUTES: u32 = 15;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Snap a raw hour/minute pair onto the 15-minute grid.
///
/// Hours clamp to 0..=23. Minutes round to the nearest quarter, with a
/// remainder of 8 or more rounding up; a round-up to 60 carries into the
/// next hour and 23 wraps to 0.
pub fn normalize(hour: i32, minute: i32) -> NaiveTime {
    let mut hour = hour.clamp(0, 23) as u32;
    let minute = minute.clamp(0, 59) as u32;

    let remainder = minute % GRID_STEP_MINUTES;
    let mut rounded = minute - remainder;
    if remainder >= 8 {
        rounded += GRID_STEP_MINUTES;
    }
    if rounded == 60 {
        rounded = 0;
        hour = (hour + 1) % 24;
    }

    NaiveTime::from_hms_opt(hour, rounded, 0).unwrap_or(NaiveTime::MIN)
}

pub fn round_time(time: NaiveTime) -> NaiveTime {
    normalize(time.hour() as i32, time.minute() as i32)
}

pub fn is_on_grid(time: NaiveTime) -> bool {
    round_time(time) == time
}

/// Parse user input such as `8:07`, `08:10` or `17:45:00` and normalize it.
pub fn parse_time_input(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let malformed = || ScheduleError::validation(format!("'{}' is not a valid time (expected HH:MM)", raw));

    let mut parts = raw.trim().split(':');
    let hour = parts.next().ok_or_else(malformed)?;
    let minute = parts.next().ok_or_else(malformed)?;
    if let Some(seconds) = parts.next() {
        seconds.parse::<u32>().map_err(|_| malformed())?;
    }
    if parts.next().is_some() {
        return Err(malformed());
    }

    let hour: i32 = hour.parse().map_err(|_| malformed())?;
    let minute: i32 = minute.parse().map_err(|_| malformed())?;
    if minute < 0 || minute > 59 {
        return Err(malformed());
    }

    Ok(normalize(hour, minute))
}

pub(crate) fn minute_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn from_minute_of_day(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

/// Ordered grid points in `[start, end)`. Cloning restarts the walk.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    cursor: u32,
    end: u32,
    step: u32,
}

impl TimeGrid {
    pub fn new(start: NaiveTime, end: NaiveTime, step_minutes: u32) -> Result<Self, ScheduleError> {
        if step_minutes == 0 || step_minutes >= MINUTES_PER_DAY {
            return Err(ScheduleError::validation(format!(
                "Grid step must be between 1 and {} minutes",
                MINUTES_PER_DAY - 1
            )));
        }
        if end < start {
            return Err(ScheduleError::validation("Grid end must not precede grid start"));
        }

        Ok(Self {
            cursor: minute_of_day(start),
            end: minute_of_day(end),
            step: step_minutes,
        })
    }
}

impl Iterator for TimeGrid {
    type Item = NaiveTime;

    fn next(&mut self) -> Option<NaiveTime> {
        if self.cursor >= self.end {
            return None;
        }
        let point = from_minute_of_day(self.cursor)?;
        self.cursor += self.step;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.cursor >= self.end {
            0
        } else {
            ((self.end - self.cursor + self.step - 1) / self.step) as usize
        };
        (remaining, Some(remaining))
    }
}

pub fn grid(start: NaiveTime, end: NaiveTime, step_minutes: u32) -> Result<TimeGrid, ScheduleError> {
    TimeGrid::new(start, end, step_minutes)
}
