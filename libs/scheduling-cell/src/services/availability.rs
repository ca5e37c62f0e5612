use std::sync::Arc;

use chrono::NaiveTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{is_valid_day_of_week, AvailabilityRule, RuleInterval};
use crate::services::store::AvailabilityRuleStore;
use crate::services::time_grid::round_time;

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityRuleStore>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AvailabilityRuleStore>) -> Self {
        Self { store }
    }

    /// Weekly rules of a professional. A professional with nothing stored
    /// gets the default week; the default is not written back.
    pub async fn list_rules(&self, professional_id: Uuid) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        let rules = self.store.list_rules(professional_id).await?;
        if rules.is_empty() {
            debug!("No rules stored for professional {}, presenting default week", professional_id);
            return Ok(default_rules(professional_id));
        }
        Ok(rules)
    }

    pub async fn rules_for_day(
        &self,
        professional_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        let mut rules: Vec<AvailabilityRule> = self
            .list_rules(professional_id)
            .await?
            .into_iter()
            .filter(|rule| rule.day_of_week == day_of_week)
            .collect();
        rules.sort_by_key(|rule| rule.start_time);
        Ok(rules)
    }

    /// What is actually stored, without the default week.
    pub async fn stored_rules(&self, professional_id: Uuid) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        self.store.list_rules(professional_id).await
    }

    pub async fn stored_rules_for_day(
        &self,
        professional_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        let mut rules: Vec<AvailabilityRule> = self
            .stored_rules(professional_id)
            .await?
            .into_iter()
            .filter(|rule| rule.day_of_week == day_of_week)
            .collect();
        rules.sort_by_key(|rule| rule.start_time);
        Ok(rules)
    }

    /// Replace the whole rule set of one weekday.
    pub async fn replace_day_rules(
        &self,
        professional_id: Uuid,
        day_of_week: i32,
        rules: Vec<RuleInterval>,
    ) -> Result<Vec<AvailabilityRule>, ScheduleError> {
        let rules = validate_day_rules(day_of_week, &rules)?;
        debug!("Saving {} intervals for professional {} on day {}", rules.len(), professional_id, day_of_week);

        let saved = self.store.replace_day_rules(professional_id, day_of_week, rules).await?;
        info!("Weekday {} rules replaced for professional {}", day_of_week, professional_id);
        Ok(saved)
    }
}

/// Normalize, order, and check the intervals of one weekday.
pub fn validate_day_rules(day_of_week: i32, rules: &[RuleInterval]) -> Result<Vec<RuleInterval>, ScheduleError> {
    if !is_valid_day_of_week(day_of_week) {
        return Err(ScheduleError::validation(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)",
        ));
    }

    let mut normalized: Vec<RuleInterval> = rules
        .iter()
        .map(|rule| RuleInterval {
            start_time: round_time(rule.start_time),
            end_time: round_time(rule.end_time),
            active: rule.active,
        })
        .collect();

    if let Some(bad) = normalized.iter().find(|rule| rule.start_time >= rule.end_time) {
        return Err(ScheduleError::validation(format!(
            "Interval {} - {} must end after it starts",
            bad.start_time.format("%H:%M"),
            bad.end_time.format("%H:%M")
        )));
    }

    normalized.sort_by_key(|rule| rule.start_time);
    for pair in normalized.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(ScheduleError::validation(format!(
                "Intervals {} - {} and {} - {} overlap",
                pair[0].start_time.format("%H:%M"),
                pair[0].end_time.format("%H:%M"),
                pair[1].start_time.format("%H:%M"),
                pair[1].end_time.format("%H:%M")
            )));
        }
    }

    Ok(normalized)
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Monday to Friday 08:00-18:00, weekends present but inactive.
pub fn default_rules(professional_id: Uuid) -> Vec<AvailabilityRule> {
    (0..=6)
        .map(|day_of_week| AvailabilityRule {
            id: None,
            professional_id,
            day_of_week,
            start_time: hm(8, 0),
            end_time: hm(18, 0),
            active: (1..=5).contains(&day_of_week),
        })
        .collect()
}

/// Intervals a weekday gets when it is switched on in the editor.
pub fn default_day_intervals() -> Vec<RuleInterval> {
    vec![
        RuleInterval::new(hm(8, 0), hm(12, 0)),
        RuleInterval::new(hm(13, 0), hm(20, 0)),
    ]
}
