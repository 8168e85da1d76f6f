//! Read-only projections of a `UserProgress` over the catalog.
//!
//! Nothing here is persisted; every value is recomputed from the record on
//! demand so it cannot drift from the source of truth.

use serde::Serialize;

use crate::model::catalog::{Catalog, DayPlan, WeekPlan};
use crate::model::ids::ChallengeId;
use crate::model::progress::{ProgressError, UserProgress};

/// Completion of one catalog day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayProgress {
    pub day: u32,
    pub week: u32,
    pub total_challenges: u32,
    pub completed_challenges: u32,
}

impl DayProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_challenges == self.total_challenges
    }
}

/// Completion of one catalog week, summed over its days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekProgress {
    pub week: u32,
    pub total_days: u32,
    pub total_challenges: u32,
    pub completed_challenges: u32,
}

/// Everything a progress page needs in one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub overall_percent: u8,
    pub completed_challenges: u32,
    pub total_challenges: u32,
    pub total_xp: u32,
    pub current_challenge: ChallengeId,
    pub weeks: Vec<WeekProgress>,
}

/// Percentage rounded half up to the nearest integer.
///
/// `completed` is clamped to `total`; an empty total yields 0.
#[must_use]
pub fn rounded_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    let percent = (completed * 100 + total / 2) / total;
    u8::try_from(percent).unwrap_or(100)
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn day_of(progress: &UserProgress, week: u32, plan: &DayPlan) -> DayProgress {
    let completed = plan
        .challenges()
        .iter()
        .filter(|entry| progress.is_completed(entry.id()))
        .count();
    DayProgress {
        day: plan.day(),
        week,
        total_challenges: saturating_u32(plan.challenges().len()),
        completed_challenges: saturating_u32(completed),
    }
}

fn week_of(progress: &UserProgress, plan: &WeekPlan) -> WeekProgress {
    plan.days().iter().fold(
        WeekProgress {
            week: plan.week(),
            total_days: saturating_u32(plan.days().len()),
            total_challenges: 0,
            completed_challenges: 0,
        },
        |mut acc, day| {
            let day = day_of(progress, plan.week(), day);
            acc.total_challenges = acc.total_challenges.saturating_add(day.total_challenges);
            acc.completed_challenges = acc
                .completed_challenges
                .saturating_add(day.completed_challenges);
            acc
        },
    )
}

impl UserProgress {
    /// Completion of `(week, day)`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::DayNotFound` if the catalog has no such day.
    pub fn day_progress(
        &self,
        catalog: &Catalog,
        week: u32,
        day: u32,
    ) -> Result<DayProgress, ProgressError> {
        let plan = catalog
            .day(week, day)
            .ok_or(ProgressError::DayNotFound { week, day })?;
        Ok(day_of(self, week, plan))
    }

    /// Completion of `week`, aggregated over every day in it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::WeekNotFound` if the catalog has no such week.
    pub fn week_progress(&self, catalog: &Catalog, week: u32) -> Result<WeekProgress, ProgressError> {
        let plan = catalog
            .week(week)
            .ok_or(ProgressError::WeekNotFound { week })?;
        Ok(week_of(self, plan))
    }

    /// Completed ids that exist in the catalog.
    #[must_use]
    pub fn completed_in_catalog(&self, catalog: &Catalog) -> usize {
        self.completed_challenges()
            .iter()
            .filter(|id| catalog.contains(id))
            .count()
    }

    /// Share of the catalog completed, 0..=100, rounded half up.
    #[must_use]
    pub fn overall_percent(&self, catalog: &Catalog) -> u8 {
        rounded_percent(self.completed_in_catalog(catalog), catalog.total_challenges())
    }

    /// XP earned across completed catalog challenges.
    #[must_use]
    pub fn total_xp(&self, catalog: &Catalog) -> u32 {
        self.completed_challenges()
            .iter()
            .filter_map(|id| catalog.xp_for(id))
            .fold(0_u32, u32::saturating_add)
    }

    #[must_use]
    pub fn summary(&self, catalog: &Catalog) -> ProgressSummary {
        ProgressSummary {
            overall_percent: self.overall_percent(catalog),
            completed_challenges: saturating_u32(self.completed_in_catalog(catalog)),
            total_challenges: saturating_u32(catalog.total_challenges()),
            total_xp: self.total_xp(catalog),
            current_challenge: self.current_challenge().clone(),
            weeks: catalog.weeks().iter().map(|w| week_of(self, w)).collect(),
        }
    }
}
