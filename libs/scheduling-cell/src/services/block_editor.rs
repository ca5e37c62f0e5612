use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{DateException, ExceptionKind, MonthWindow};
use crate::services::clock::Clock;
use crate::services::exceptions::DateBlockService;
use crate::settings::ScheduleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Range,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockEditorState {
    Idle,
    Selecting,
    Committing,
}

/// Pending full-day blocks picked on a month calendar.
///
/// In range mode the first click anchors the range, the second closes it
/// (swapping ends when clicked earlier) and a third starts over. In single
/// mode clicks toggle individual dates. Past dates and dates already fully
/// blocked never enter the selection.
pub struct DateBlockEditor {
    professional_id: Uuid,
    mode: SelectionMode,
    state: BlockEditorState,
    range_start: Option<NaiveDate>,
    range_end: Option<NaiveDate>,
    singles: BTreeSet<NaiveDate>,
    month: MonthWindow,
    exceptions: Vec<DateException>,
    last_error: Option<ScheduleError>,
    clock: Arc<dyn Clock>,
    settings: ScheduleSettings,
}

impl DateBlockEditor {
    pub fn new(
        professional_id: Uuid,
        month: MonthWindow,
        clock: Arc<dyn Clock>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            professional_id,
            mode: SelectionMode::Range,
            state: BlockEditorState::Idle,
            range_start: None,
            range_end: None,
            singles: BTreeSet::new(),
            month,
            exceptions: Vec::new(),
            last_error: None,
            clock,
            settings,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn state(&self) -> BlockEditorState {
        self.state
    }

    pub fn month(&self) -> MonthWindow {
        self.month
    }

    pub fn exceptions(&self) -> &[DateException] {
        &self.exceptions
    }

    pub fn last_error(&self) -> Option<&ScheduleError> {
        self.last_error.as_ref()
    }

    /// Replace the exceptions shown for the visible month.
    pub fn load_exceptions(&mut self, exceptions: Vec<DateException>) {
        self.exceptions = exceptions;
    }

    pub fn fully_blocked_dates(&self) -> BTreeSet<NaiveDate> {
        self.exceptions
            .iter()
            .filter(|e| e.kind == ExceptionKind::FullDay)
            .map(|e| self.settings.local_date(e.start_at))
            .collect()
    }

    fn today(&self) -> NaiveDate {
        self.settings.local_date(self.clock.now())
    }

    /// Switching modes drops whatever was selected.
    pub fn set_mode(&mut self, mode: SelectionMode) -> Result<(), ScheduleError> {
        if self.state == BlockEditorState::Committing {
            return Err(ScheduleError::SaveInProgress("Date blocks".to_string()));
        }
        self.mode = mode;
        self.clear_selection();
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.range_start = None;
        self.range_end = None;
        self.singles.clear();
        if self.state == BlockEditorState::Selecting {
            self.state = BlockEditorState::Idle;
        }
    }

    /// Returns whether the click changed the selection.
    pub fn click(&mut self, date: NaiveDate) -> bool {
        if self.state == BlockEditorState::Committing {
            return false;
        }
        if date < self.today() || self.fully_blocked_dates().contains(&date) {
            debug!("Ignoring click on unavailable date {}", date);
            return false;
        }

        match self.mode {
            SelectionMode::Range => match (self.range_start, self.range_end) {
                (Some(start), None) if date < start => {
                    self.range_start = Some(date);
                    self.range_end = Some(start);
                }
                (Some(_), None) => self.range_end = Some(date),
                _ => {
                    self.range_start = Some(date);
                    self.range_end = None;
                }
            },
            SelectionMode::Single => {
                if !self.singles.remove(&date) {
                    self.singles.insert(date);
                }
            }
        }

        self.state = if self.has_selection() {
            BlockEditorState::Selecting
        } else {
            BlockEditorState::Idle
        };
        true
    }

    fn has_selection(&self) -> bool {
        self.range_start.is_some() || !self.singles.is_empty()
    }

    /// Inclusive range as currently anchored; an unclosed range is one day.
    pub fn pending_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range_start
            .map(|start| (start, self.range_end.unwrap_or(start)))
    }

    /// Dates a commit would block right now.
    pub fn selected_dates(&self) -> BTreeSet<NaiveDate> {
        let today = self.today();
        let blocked = self.fully_blocked_dates();

        let candidates: BTreeSet<NaiveDate> = match self.mode {
            SelectionMode::Range => match self.pending_range() {
                Some((start, end)) => start.iter_days().take_while(|d| *d <= end).collect(),
                None => BTreeSet::new(),
            },
            SelectionMode::Single => self.singles.clone(),
        };

        candidates
            .into_iter()
            .filter(|date| *date >= today && !blocked.contains(date))
            .collect()
    }

    pub fn can_commit(&self) -> bool {
        self.state != BlockEditorState::Committing && !self.selected_dates().is_empty()
    }

    pub fn begin_commit(&mut self) -> Result<BTreeSet<NaiveDate>, ScheduleError> {
        if self.state == BlockEditorState::Committing {
            return Err(ScheduleError::SaveInProgress("Date blocks".to_string()));
        }
        let dates = self.selected_dates();
        if dates.is_empty() {
            return Err(ScheduleError::validation("Select at least one date to block"));
        }
        self.state = BlockEditorState::Committing;
        self.last_error = None;
        Ok(dates)
    }

    /// A failed batch keeps the selection so it can be retried as is.
    pub fn complete_commit(&mut self, outcome: Result<usize, ScheduleError>) -> Result<usize, ScheduleError> {
        match outcome {
            Ok(count) => {
                self.range_start = None;
                self.range_end = None;
                self.singles.clear();
                self.state = BlockEditorState::Idle;
                Ok(count)
            }
            Err(e) => {
                self.state = BlockEditorState::Selecting;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub async fn commit(&mut self, service: &DateBlockService, note: Option<String>) -> Result<usize, ScheduleError> {
        let dates = self.begin_commit()?;
        let outcome = service
            .block_dates(self.professional_id, &dates, ExceptionKind::FullDay, note)
            .await;
        let count = self.complete_commit(outcome)?;

        info!("Committed {} date blocks for professional {}", count, self.professional_id);
        self.refresh_after_write(service).await;
        Ok(count)
    }

    /// Re-read the visible month.
    pub async fn refresh(&mut self, service: &DateBlockService) -> Result<(), ScheduleError> {
        let exceptions = service.list_exceptions(self.professional_id, self.month).await?;
        self.load_exceptions(exceptions);
        Ok(())
    }

    /// Move to another month and load it. The selection is kept.
    pub async fn show_month(&mut self, month: MonthWindow, service: &DateBlockService) -> Result<(), ScheduleError> {
        self.month = month;
        self.refresh(service).await
    }

    pub async fn unblock(&mut self, exception_id: Uuid, service: &DateBlockService) -> Result<(), ScheduleError> {
        service.unblock_date(self.professional_id, exception_id).await?;
        self.refresh_after_write(service).await;
        Ok(())
    }

    /// The write already landed; a failed re-read only leaves the month stale.
    async fn refresh_after_write(&mut self, service: &DateBlockService) {
        if let Err(e) = self.refresh(service).await {
            warn!("Re-read of {} .. {} failed after write: {}", self.month.start, self.month.end, e);
            self.last_error = Some(e);
        }
    }
}
