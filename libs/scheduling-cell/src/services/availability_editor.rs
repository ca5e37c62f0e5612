//! Pending weekly-availability edits, tracked and saved one weekday at a time.
//!
//! Per weekday: `Clean -> Dirty` on any edit, `Dirty -> Saving` when a save
//! starts, then `JustSaved` (reads as `Clean` after a few seconds) on success
//! or back to `Dirty` with the error kept on failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{is_valid_day_of_week, AvailabilityRule, RuleInterval};
use crate::services::availability::{
    default_day_intervals, default_rules, validate_day_rules, AvailabilityService,
};
use crate::services::clock::Clock;
use crate::services::time_grid::round_time;

/// How long a successful save keeps showing as such.
pub const JUST_SAVED_SECONDS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayEditState {
    Clean,
    Dirty,
    Saving,
    JustSaved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DraftState {
    Clean,
    Dirty,
    Saving,
    JustSaved { until: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct DayDraft {
    intervals: Vec<RuleInterval>,
    state: DraftState,
    last_error: Option<ScheduleError>,
}

impl Default for DayDraft {
    fn default() -> Self {
        Self {
            intervals: Vec::new(),
            state: DraftState::Clean,
            last_error: None,
        }
    }
}

/// Proof that a weekday entered `Saving`; hand it back to `complete_save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    pub day_of_week: i32,
    pub intervals: Vec<RuleInterval>,
}

pub struct AvailabilityEditor {
    professional_id: Uuid,
    days: BTreeMap<i32, DayDraft>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityEditor {
    pub fn new(professional_id: Uuid, clock: Arc<dyn Clock>) -> Self {
        Self {
            professional_id,
            days: (0..=6).map(|day| (day, DayDraft::default())).collect(),
            clock,
        }
    }

    pub fn professional_id(&self) -> Uuid {
        self.professional_id
    }

    /// Replace every weekday's draft with stored rules. Only active rules
    /// become intervals; a weekday without any reads as switched off.
    pub fn load(&mut self, rules: &[AvailabilityRule]) {
        for (day, draft) in self.days.iter_mut() {
            draft.intervals = active_intervals(rules, *day);
            draft.state = DraftState::Clean;
            draft.last_error = None;
        }
    }

    /// Load rules that are not in the store yet. Every weekday that ends up
    /// with intervals is `Dirty` until saved.
    pub fn load_unsaved(&mut self, rules: &[AvailabilityRule]) {
        self.load(rules);
        for draft in self.days.values_mut() {
            if !draft.intervals.is_empty() {
                draft.state = DraftState::Dirty;
            }
        }
    }

    /// Fetch the stored week and load it. With nothing stored the default
    /// week loads as unsaved edits.
    pub async fn load_from(&mut self, service: &AvailabilityService) -> Result<(), ScheduleError> {
        let stored = service.stored_rules(self.professional_id).await?;
        if stored.is_empty() {
            debug!("No stored week for professional {}, loading default as unsaved", self.professional_id);
            self.load_unsaved(&default_rules(self.professional_id));
        } else {
            self.load(&stored);
        }
        Ok(())
    }

    pub fn intervals(&self, day_of_week: i32) -> &[RuleInterval] {
        self.days
            .get(&day_of_week)
            .map(|draft| draft.intervals.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_day_enabled(&self, day_of_week: i32) -> bool {
        !self.intervals(day_of_week).is_empty()
    }

    pub fn state(&self, day_of_week: i32) -> DayEditState {
        match self.days.get(&day_of_week).map(|draft| draft.state) {
            Some(DraftState::Dirty) => DayEditState::Dirty,
            Some(DraftState::Saving) => DayEditState::Saving,
            Some(DraftState::JustSaved { until }) if self.clock.now() < until => DayEditState::JustSaved,
            _ => DayEditState::Clean,
        }
    }

    pub fn dirty_days(&self) -> Vec<i32> {
        self.days
            .iter()
            .filter(|(_, draft)| draft.state == DraftState::Dirty)
            .map(|(day, _)| *day)
            .collect()
    }

    pub fn last_error(&self, day_of_week: i32) -> Option<&ScheduleError> {
        self.days.get(&day_of_week).and_then(|draft| draft.last_error.as_ref())
    }

    fn editable(&mut self, day_of_week: i32) -> Result<&mut DayDraft, ScheduleError> {
        if !is_valid_day_of_week(day_of_week) {
            return Err(ScheduleError::validation(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)",
            ));
        }
        let draft = self.days.entry(day_of_week).or_default();
        if draft.state == DraftState::Saving {
            return Err(ScheduleError::SaveInProgress(format!("Weekday {}", day_of_week)));
        }
        Ok(draft)
    }

    pub fn add_interval(&mut self, day_of_week: i32, start: NaiveTime, end: NaiveTime) -> Result<(), ScheduleError> {
        let interval = checked_interval(start, end)?;
        let draft = self.editable(day_of_week)?;
        ensure_no_overlap(&draft.intervals, &interval, None)?;

        draft.intervals.push(interval);
        draft.intervals.sort_by_key(|i| i.start_time);
        mark_dirty(draft);
        Ok(())
    }

    pub fn update_interval(
        &mut self,
        day_of_week: i32,
        index: usize,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<(), ScheduleError> {
        let interval = checked_interval(start, end)?;
        let draft = self.editable(day_of_week)?;
        if index >= draft.intervals.len() {
            return Err(ScheduleError::validation(format!("No interval at position {}", index)));
        }
        ensure_no_overlap(&draft.intervals, &interval, Some(index))?;

        draft.intervals[index] = interval;
        draft.intervals.sort_by_key(|i| i.start_time);
        mark_dirty(draft);
        Ok(())
    }

    pub fn remove_interval(&mut self, day_of_week: i32, index: usize) -> Result<RuleInterval, ScheduleError> {
        let draft = self.editable(day_of_week)?;
        if index >= draft.intervals.len() {
            return Err(ScheduleError::validation(format!("No interval at position {}", index)));
        }
        let removed = draft.intervals.remove(index);
        mark_dirty(draft);
        Ok(removed)
    }

    /// Switching a day on seeds the default morning and afternoon blocks;
    /// switching it off drops every local interval. Nothing is persisted
    /// until the day is saved.
    pub fn toggle_day(&mut self, day_of_week: i32, enabled: bool) -> Result<(), ScheduleError> {
        let draft = self.editable(day_of_week)?;
        let currently_enabled = !draft.intervals.is_empty();
        if currently_enabled == enabled {
            return Ok(());
        }

        draft.intervals = if enabled { default_day_intervals() } else { Vec::new() };
        mark_dirty(draft);
        Ok(())
    }

    /// Move a dirty weekday into `Saving`. A weekday already saving is
    /// refused so at most one write per weekday is in flight.
    pub fn begin_save(&mut self, day_of_week: i32) -> Result<SaveTicket, ScheduleError> {
        let draft = self.editable(day_of_week).map_err(|e| {
            if matches!(e, ScheduleError::SaveInProgress(_)) {
                warn!("Ignoring second save for weekday {} while one is in flight", day_of_week);
            }
            e
        })?;
        if draft.state != DraftState::Dirty {
            return Err(ScheduleError::validation(format!(
                "Weekday {} has no unsaved changes",
                day_of_week
            )));
        }

        let intervals = match validate_day_rules(day_of_week, &draft.intervals) {
            Ok(intervals) => intervals,
            Err(e) => {
                draft.last_error = Some(e.clone());
                return Err(e);
            }
        };

        draft.state = DraftState::Saving;
        draft.last_error = None;
        Ok(SaveTicket { day_of_week, intervals })
    }

    /// Settle a save. `fresh` is the weekday's rule set as re-read after a
    /// successful write.
    pub fn complete_save(
        &mut self,
        ticket: SaveTicket,
        outcome: Result<Vec<AvailabilityRule>, ScheduleError>,
    ) -> Result<(), ScheduleError> {
        let until = self.clock.now() + Duration::seconds(JUST_SAVED_SECONDS);
        let draft = self.days.entry(ticket.day_of_week).or_default();

        match outcome {
            Ok(fresh) => {
                draft.intervals = active_intervals(&fresh, ticket.day_of_week);
                draft.state = DraftState::JustSaved { until };
                draft.last_error = None;
                Ok(())
            }
            Err(e) => {
                draft.state = DraftState::Dirty;
                draft.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Persist one weekday and re-read it.
    pub async fn save_day(&mut self, day_of_week: i32, service: &AvailabilityService) -> Result<(), ScheduleError> {
        let ticket = self.begin_save(day_of_week)?;
        debug!("Saving weekday {} for professional {}", day_of_week, self.professional_id);

        let outcome = match service
            .replace_day_rules(self.professional_id, day_of_week, ticket.intervals.clone())
            .await
        {
            Ok(saved) => match service.stored_rules_for_day(self.professional_id, day_of_week).await {
                Ok(fresh) => Ok(fresh),
                Err(e) => {
                    warn!("Re-read of weekday {} failed after save, using write result: {}", day_of_week, e);
                    Ok(saved)
                }
            },
            Err(e) => Err(e),
        };

        let result = self.complete_save(ticket, outcome);
        if result.is_ok() {
            info!("Weekday {} saved for professional {}", day_of_week, self.professional_id);
        }
        result
    }

    /// Save every dirty weekday in turn. A failed weekday stays dirty and
    /// does not stop the rest; the first failure is returned.
    pub async fn save_all(&mut self, service: &AvailabilityService) -> Result<usize, ScheduleError> {
        let mut saved = 0;
        let mut first_error = None;

        for day_of_week in self.dirty_days() {
            match self.save_day(day_of_week, service).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!("Saving weekday {} failed: {}", day_of_week, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }
}

fn mark_dirty(draft: &mut DayDraft) {
    draft.state = DraftState::Dirty;
}

fn active_intervals(rules: &[AvailabilityRule], day_of_week: i32) -> Vec<RuleInterval> {
    let mut intervals: Vec<RuleInterval> = rules
        .iter()
        .filter(|rule| rule.day_of_week == day_of_week && rule.active)
        .map(AvailabilityRule::interval)
        .collect();
    intervals.sort_by_key(|i| i.start_time);
    intervals
}

fn checked_interval(start: NaiveTime, end: NaiveTime) -> Result<RuleInterval, ScheduleError> {
    let interval = RuleInterval::new(round_time(start), round_time(end));
    if interval.start_time >= interval.end_time {
        return Err(ScheduleError::validation("End time must be after start time"));
    }
    Ok(interval)
}

fn ensure_no_overlap(
    existing: &[RuleInterval],
    candidate: &RuleInterval,
    skip: Option<usize>,
) -> Result<(), ScheduleError> {
    let clash = existing
        .iter()
        .enumerate()
        .any(|(index, other)| Some(index) != skip && other.overlaps(candidate));
    if clash {
        return Err(ScheduleError::validation("Interval overlaps another interval of the same day"));
    }
    Ok(())
}
