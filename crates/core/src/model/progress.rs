use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::catalog::Catalog;
use crate::model::ids::ChallengeId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("unknown challenge: {0}")]
    UnknownChallenge(ChallengeId),

    #[error("day {day} of week {week} is not in the catalog")]
    DayNotFound { week: u32, day: u32 },

    #[error("week {week} is not in the catalog")]
    WeekNotFound { week: u32 },

    #[error("last_activity is before started_at")]
    InvalidTimeRange,
}

//
// ─── ADVANCE POLICY ────────────────────────────────────────────────────────────
//

/// How `current_challenge` moves when a challenge is marked complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicy {
    /// Move on only when the completed challenge is the current one.
    #[default]
    #[serde(alias = "only-if-current")]
    OnlyIfCurrent,
    /// Always jump to the challenge after the completed one.
    Always,
}

impl fmt::Display for AdvancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvancePolicy::OnlyIfCurrent => f.write_str("only_if_current"),
            AdvancePolicy::Always => f.write_str("always"),
        }
    }
}

impl FromStr for AdvancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "only_if_current" | "only-if-current" => Ok(Self::OnlyIfCurrent),
            "always" => Ok(Self::Always),
            other => Err(format!("unknown advance policy: {other}")),
        }
    }
}

/// What `UserProgress::mark_complete` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Newly completed; `advanced_to` is the new current challenge when it moved.
    Completed { advanced_to: Option<ChallengeId> },
    /// Already in the completed set; nothing changed.
    AlreadyCompleted,
}

impl MarkOutcome {
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, MarkOutcome::Completed { .. })
    }
}

//
// ─── USER PROGRESS ─────────────────────────────────────────────────────────────
//

/// One learner's course-progress record.
///
/// Invariants:
/// - `started_at` never changes after creation;
/// - `last_activity >= started_at` and it never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ProgressWire")]
pub struct UserProgress {
    completed_challenges: BTreeSet<ChallengeId>,
    current_challenge: ChallengeId,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressWire {
    #[serde(default)]
    completed_challenges: BTreeSet<ChallengeId>,
    current_challenge: ChallengeId,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl TryFrom<ProgressWire> for UserProgress {
    type Error = ProgressError;

    fn try_from(wire: ProgressWire) -> Result<Self, Self::Error> {
        Self::from_persisted(
            wire.completed_challenges,
            wire.current_challenge,
            wire.started_at,
            wire.last_activity,
        )
    }
}

impl UserProgress {
    /// Fresh record positioned on the catalog's first challenge.
    #[must_use]
    pub fn start(catalog: &Catalog, now: DateTime<Utc>) -> Self {
        Self {
            completed_challenges: BTreeSet::new(),
            current_challenge: catalog.first_challenge().clone(),
            started_at: now,
            last_activity: now,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidTimeRange` if `last_activity` precedes `started_at`.
    pub fn from_persisted(
        completed_challenges: impl IntoIterator<Item = ChallengeId>,
        current_challenge: ChallengeId,
        started_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if last_activity < started_at {
            return Err(ProgressError::InvalidTimeRange);
        }
        Ok(Self {
            completed_challenges: completed_challenges.into_iter().collect(),
            current_challenge,
            started_at,
            last_activity,
        })
    }

    #[must_use]
    pub fn completed_challenges(&self) -> &BTreeSet<ChallengeId> {
        &self.completed_challenges
    }

    #[must_use]
    pub fn current_challenge(&self) -> &ChallengeId {
        &self.current_challenge
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[must_use]
    pub fn is_completed(&self, id: &ChallengeId) -> bool {
        self.completed_challenges.contains(id)
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed_challenges.len()
    }

    /// Record `id` as completed.
    ///
    /// Re-marking a completed challenge changes nothing. Otherwise the id is
    /// added, `last_activity` moves to `now` (never backwards), and the current
    /// challenge advances according to `policy`. The last challenge of the
    /// course has no successor, so the current challenge stays put.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownChallenge` if `id` is not in the catalog;
    /// the record is left untouched.
    pub fn mark_complete(
        &mut self,
        catalog: &Catalog,
        id: &ChallengeId,
        now: DateTime<Utc>,
        policy: AdvancePolicy,
    ) -> Result<MarkOutcome, ProgressError> {
        if !catalog.contains(id) {
            return Err(ProgressError::UnknownChallenge(id.clone()));
        }
        if self.completed_challenges.contains(id) {
            return Ok(MarkOutcome::AlreadyCompleted);
        }

        self.completed_challenges.insert(id.clone());
        self.last_activity = self.last_activity.max(now);

        let should_advance = match policy {
            AdvancePolicy::Always => true,
            AdvancePolicy::OnlyIfCurrent => *id == self.current_challenge,
        };
        let advanced_to = if should_advance {
            catalog.next_after(id).cloned()
        } else {
            None
        };
        if let Some(next) = &advanced_to {
            self.current_challenge = next.clone();
        }

        Ok(MarkOutcome::Completed { advanced_to })
    }

    /// Merge another copy of the same learner's record by union.
    ///
    /// Completed sets are unioned and the earliest `started_at` wins. The
    /// current challenge comes from the side with the later `last_activity`
    /// (ties keep `self`), unless the union already completes it. Then the
    /// other side's current is used, or the first incomplete challenge in
    /// catalog order when both are done.
    pub fn merge(&mut self, other: &UserProgress, catalog: &Catalog) {
        let (preferred, fallback) = if other.last_activity > self.last_activity {
            (other.current_challenge.clone(), self.current_challenge.clone())
        } else {
            (self.current_challenge.clone(), other.current_challenge.clone())
        };

        self.completed_challenges
            .extend(other.completed_challenges.iter().cloned());
        self.last_activity = self.last_activity.max(other.last_activity);
        self.started_at = self.started_at.min(other.started_at);

        let open = |id: &ChallengeId| catalog.contains(id) && !self.completed_challenges.contains(id);
        let current = if open(&preferred) {
            preferred
        } else if open(&fallback) {
            fallback
        } else {
            catalog
                .challenges()
                .find(|id| !self.completed_challenges.contains(*id))
                .cloned()
                .unwrap_or(preferred)
        };
        self.current_challenge = current;
        self.repair_current(catalog);
    }

    /// Drop completed ids the catalog does not know. Returns how many were dropped.
    pub fn retain_known(&mut self, catalog: &Catalog) -> usize {
        let before = self.completed_challenges.len();
        self.completed_challenges.retain(|id| catalog.contains(id));
        before - self.completed_challenges.len()
    }

    /// Point `current_challenge` back into the catalog if it fell out of it.
    ///
    /// Picks the first incomplete challenge, or the first challenge when the
    /// whole course is done. Returns `true` when a repair happened.
    pub fn repair_current(&mut self, catalog: &Catalog) -> bool {
        if catalog.contains(&self.current_challenge) {
            return false;
        }
        let target = catalog
            .challenges()
            .find(|id| !self.completed_challenges.contains(*id))
            .unwrap_or_else(|| catalog.first_challenge());
        self.current_challenge = target.clone();
        true
    }
}
