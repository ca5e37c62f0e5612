use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{DateException, ExceptionKind, MonthWindow, NewDateException};
use crate::services::clock::Clock;
use crate::services::store::DateExceptionStore;
use crate::services::time_grid::{round_time, GRID_STEP_MINUTES};
use crate::settings::ScheduleSettings;

/// Full-day and single-slot blocks of a professional's calendar.
pub struct DateBlockService {
    store: Arc<dyn DateExceptionStore>,
    clock: Arc<dyn Clock>,
    settings: ScheduleSettings,
}

impl DateBlockService {
    pub fn new(
        store: Arc<dyn DateExceptionStore>,
        clock: Arc<dyn Clock>,
        settings: ScheduleSettings,
    ) -> Self {
        Self { store, clock, settings }
    }

    fn today(&self) -> NaiveDate {
        self.settings.local_date(self.clock.now())
    }

    pub async fn list_exceptions(
        &self,
        professional_id: Uuid,
        month: MonthWindow,
    ) -> Result<Vec<DateException>, ScheduleError> {
        debug!("Listing exceptions for professional {} in {} .. {}", professional_id, month.start, month.end);

        let (from, _) = self.settings.day_bounds(month.start);
        let (_, to) = self.settings.day_bounds(month.end);
        self.store.list_exceptions(professional_id, from, to).await
    }

    /// Exceptions starting on one local date.
    pub async fn exceptions_on(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<DateException>, ScheduleError> {
        let (from, to) = self.settings.day_bounds(date);
        self.store.list_exceptions(professional_id, from, to).await
    }

    /// Block every date in `dates` for the whole day as one batch. Dates
    /// already blocked for the whole day are skipped; the count returned is
    /// what was newly created.
    pub async fn block_dates(
        &self,
        professional_id: Uuid,
        dates: &BTreeSet<NaiveDate>,
        kind: ExceptionKind,
        note: Option<String>,
    ) -> Result<usize, ScheduleError> {
        if kind != ExceptionKind::FullDay {
            return Err(ScheduleError::validation(
                "Only full-day blocks can be created for whole dates; block a single slot instead",
            ));
        }
        if dates.is_empty() {
            return Err(ScheduleError::validation("Select at least one date to block"));
        }

        let today = self.today();
        if let Some(past) = dates.iter().find(|date| **date < today) {
            return Err(ScheduleError::validation(format!("{} is in the past and cannot be blocked", past)));
        }

        let already = self.fully_blocked_between(professional_id, dates).await?;
        let batch: Vec<NewDateException> = dates
            .iter()
            .filter(|date| !already.contains(date))
            .map(|date| {
                let (start_at, end_at) = self.settings.full_day_span(*date);
                NewDateException {
                    professional_id,
                    start_at,
                    end_at,
                    kind,
                    note: note.clone(),
                }
            })
            .collect();

        if batch.is_empty() {
            debug!("Every requested date is already blocked for professional {}", professional_id);
            return Ok(0);
        }

        let created = self.store.insert_exceptions(batch).await?;
        info!("Blocked {} dates for professional {}", created.len(), professional_id);
        Ok(created.len())
    }

    /// Block one grid unit starting at `time` (normalized onto the grid).
    /// Blocking a slot that is already blocked returns the existing block.
    pub async fn block_single_slot(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<DateException, ScheduleError> {
        let time = round_time(time);
        let start_at = self.settings.local_instant(date, time);
        if start_at < self.clock.now() {
            return Err(ScheduleError::validation("Slots in the past cannot be blocked"));
        }

        let existing = self.exceptions_on(professional_id, date).await?;
        if existing.iter().any(|e| e.kind == ExceptionKind::FullDay) {
            return Err(ScheduleError::validation(format!("{} is already blocked for the whole day", date)));
        }
        if let Some(block) = existing
            .into_iter()
            .find(|e| e.kind == ExceptionKind::ManualSlot && e.start_at == start_at)
        {
            debug!("Slot {} {} already blocked by {}", date, time, block.id);
            return Ok(block);
        }

        let block = NewDateException {
            professional_id,
            start_at,
            end_at: start_at + Duration::minutes(GRID_STEP_MINUTES as i64),
            kind: ExceptionKind::ManualSlot,
            note: None,
        };

        let created = self
            .store
            .insert_exceptions(vec![block])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::StoreRejected("Store returned no created block".to_string()))?;

        info!("Blocked slot {} {} for professional {}", date, time, professional_id);
        Ok(created)
    }

    /// Local dates among `dates` that already carry a full-day block.
    async fn fully_blocked_between(
        &self,
        professional_id: Uuid,
        dates: &BTreeSet<NaiveDate>,
    ) -> Result<BTreeSet<NaiveDate>, ScheduleError> {
        let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
            return Ok(BTreeSet::new());
        };
        let (from, _) = self.settings.day_bounds(*first);
        let (_, to) = self.settings.day_bounds(*last);

        Ok(self
            .store
            .list_exceptions(professional_id, from, to)
            .await?
            .into_iter()
            .filter(|e| e.kind == ExceptionKind::FullDay)
            .map(|e| self.settings.local_date(e.start_at))
            .filter(|date| dates.contains(date))
            .collect())
    }

    /// Remove one exception. Already gone counts as done.
    pub async fn unblock_date(&self, professional_id: Uuid, exception_id: Uuid) -> Result<(), ScheduleError> {
        match self.store.delete_exception(professional_id, exception_id).await {
            Ok(()) => {
                info!("Removed date exception {}", exception_id);
                Ok(())
            }
            Err(ScheduleError::NotFound(_)) => {
                warn!("Date exception {} was already removed", exception_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
