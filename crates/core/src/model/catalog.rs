use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thiserror::Error;

use crate::model::ids::ChallengeId;

/// XP awarded for a challenge when the catalog does not say otherwise.
pub const DEFAULT_CHALLENGE_XP: u32 = 10;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("catalog contains no challenges")]
    Empty,

    #[error("week number must be >= 1")]
    InvalidWeek,

    #[error("day number must be >= 1 (week {week})")]
    InvalidDay { week: u32 },

    #[error("week {0} is listed more than once")]
    DuplicateWeek(u32),

    #[error("day {day} of week {week} is listed more than once")]
    DuplicateDay { week: u32, day: u32 },

    #[error("challenge {0} is listed more than once")]
    DuplicateChallenge(ChallengeId),

    #[error("invalid challenge id: {0:?}")]
    InvalidChallengeId(String),

    #[error("invalid catalog document: {0}")]
    Parse(String),
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated catalog, as read from a course file or assembled in code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub weeks: Vec<WeekDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeekDraft {
    pub week: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub days: Vec<DayDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DayDraft {
    pub day: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub challenges: Vec<ChallengeDraft>,
}

/// A challenge is either a bare id string or an object with an XP reward.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChallengeDraft {
    Bare(String),
    Detailed {
        id: String,
        #[serde(default = "default_xp")]
        xp: u32,
    },
}

fn default_xp() -> u32 {
    DEFAULT_CHALLENGE_XP
}

impl ChallengeDraft {
    fn into_entry(self) -> Result<ChallengeEntry, CatalogError> {
        let (raw, xp) = match self {
            ChallengeDraft::Bare(id) => (id, DEFAULT_CHALLENGE_XP),
            ChallengeDraft::Detailed { id, xp } => (id, xp),
        };
        let id = ChallengeId::new(raw.clone()).map_err(|_| CatalogError::InvalidChallengeId(raw))?;
        Ok(ChallengeEntry { id, xp })
    }
}

impl CatalogDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a day with default-XP challenges, creating the week if needed.
    #[must_use]
    pub fn with_day(mut self, week: u32, day: u32, challenges: &[&str]) -> Self {
        let day = DayDraft {
            day,
            title: None,
            challenges: challenges
                .iter()
                .map(|id| ChallengeDraft::Bare((*id).to_string()))
                .collect(),
        };
        match self.weeks.iter_mut().find(|w| w.week == week) {
            Some(existing) => existing.days.push(day),
            None => self.weeks.push(WeekDraft {
                week,
                title: None,
                days: vec![day],
            }),
        }
        self
    }

    /// Validate and order the draft into an immutable `Catalog`.
    ///
    /// Weeks are ordered by week number and days by day number; challenges
    /// keep their listed order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for empty catalogs, zero or duplicate week/day
    /// numbers, malformed ids, or ids listed twice.
    pub fn validate(self) -> Result<Catalog, CatalogError> {
        let mut seen_weeks = HashSet::new();
        let mut weeks = Vec::with_capacity(self.weeks.len());

        for week in self.weeks {
            if week.week == 0 {
                return Err(CatalogError::InvalidWeek);
            }
            if !seen_weeks.insert(week.week) {
                return Err(CatalogError::DuplicateWeek(week.week));
            }

            let mut seen_days = HashSet::new();
            let mut days = Vec::with_capacity(week.days.len());
            for day in week.days {
                if day.day == 0 {
                    return Err(CatalogError::InvalidDay { week: week.week });
                }
                if !seen_days.insert(day.day) {
                    return Err(CatalogError::DuplicateDay {
                        week: week.week,
                        day: day.day,
                    });
                }
                let challenges = day
                    .challenges
                    .into_iter()
                    .map(ChallengeDraft::into_entry)
                    .collect::<Result<Vec<_>, _>>()?;
                days.push(DayPlan {
                    day: day.day,
                    title: day.title,
                    challenges,
                });
            }
            days.sort_by_key(|d| d.day);

            weeks.push(WeekPlan {
                week: week.week,
                title: week.title,
                days,
            });
        }
        weeks.sort_by_key(|w| w.week);

        let mut order = Vec::new();
        let mut index = HashMap::new();
        for week in &weeks {
            for day in &week.days {
                for entry in &day.challenges {
                    let slot = Slot {
                        ordinal: order.len(),
                        week: week.week,
                        day: day.day,
                        xp: entry.xp,
                    };
                    if index.insert(entry.id.clone(), slot).is_some() {
                        return Err(CatalogError::DuplicateChallenge(entry.id.clone()));
                    }
                    order.push(entry.id.clone());
                }
            }
        }

        if order.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Catalog {
            title: self.title,
            weeks,
            order,
            index,
        })
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeEntry {
    id: ChallengeId,
    xp: u32,
}

impl ChallengeEntry {
    #[must_use]
    pub fn id(&self) -> &ChallengeId {
        &self.id
    }

    #[must_use]
    pub fn xp(&self) -> u32 {
        self.xp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPlan {
    day: u32,
    title: Option<String>,
    challenges: Vec<ChallengeEntry>,
}

impl DayPlan {
    #[must_use]
    pub fn day(&self) -> u32 {
        self.day
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn challenges(&self) -> &[ChallengeEntry] {
        &self.challenges
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekPlan {
    week: u32,
    title: Option<String>,
    days: Vec<DayPlan>,
}

impl WeekPlan {
    #[must_use]
    pub fn week(&self) -> u32 {
        self.week
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn days(&self) -> &[DayPlan] {
        &self.days
    }

    #[must_use]
    pub fn day(&self, day: u32) -> Option<&DayPlan> {
        self.days.iter().find(|d| d.day == day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    ordinal: usize,
    week: u32,
    day: u32,
    xp: u32,
}

/// Immutable course structure: weeks → days → challenges.
///
/// Guaranteed to hold at least one challenge, and every challenge id is
/// unique across the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    title: Option<String>,
    weeks: Vec<WeekPlan>,
    order: Vec<ChallengeId>,
    index: HashMap<ChallengeId, Slot>,
}

impl Catalog {
    /// Parse and validate a JSON course document.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed JSON and any validation
    /// error from `CatalogDraft::validate`.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let draft: CatalogDraft =
            serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
        draft.validate()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn weeks(&self) -> &[WeekPlan] {
        &self.weeks
    }

    #[must_use]
    pub fn week(&self, week: u32) -> Option<&WeekPlan> {
        self.weeks.iter().find(|w| w.week == week)
    }

    #[must_use]
    pub fn day(&self, week: u32, day: u32) -> Option<&DayPlan> {
        self.week(week).and_then(|w| w.day(day))
    }

    #[must_use]
    pub fn contains(&self, id: &ChallengeId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn total_challenges(&self) -> usize {
        self.order.len()
    }

    /// All challenge ids in course order.
    pub fn challenges(&self) -> impl Iterator<Item = &ChallengeId> {
        self.order.iter()
    }

    #[must_use]
    pub fn first_challenge(&self) -> &ChallengeId {
        // `validate` rejects empty catalogs.
        &self.order[0]
    }

    /// The challenge that follows `id` in course order, if any.
    #[must_use]
    pub fn next_after(&self, id: &ChallengeId) -> Option<&ChallengeId> {
        let slot = self.index.get(id)?;
        self.order.get(slot.ordinal + 1)
    }

    /// `(week, day)` coordinates of a challenge.
    #[must_use]
    pub fn position_of(&self, id: &ChallengeId) -> Option<(u32, u32)> {
        self.index.get(id).map(|slot| (slot.week, slot.day))
    }

    #[must_use]
    pub fn xp_for(&self, id: &ChallengeId) -> Option<u32> {
        self.index.get(id).map(|slot| slot.xp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ChallengeId {
        ChallengeId::new(raw).unwrap()
    }

    #[test]
    fn orders_weeks_and_days_numerically() {
        let catalog = CatalogDraft::new()
            .with_day(2, 1, &["w2-d1-c1"])
            .with_day(1, 2, &["w1-d2-c1"])
            .with_day(1, 1, &["w1-d1-c1", "w1-d1-c2"])
            .validate()
            .unwrap();

        let order: Vec<&str> = catalog.challenges().map(ChallengeId::as_str).collect();
        assert_eq!(order, ["w1-d1-c1", "w1-d1-c2", "w1-d2-c1", "w2-d1-c1"]);
        assert_eq!(catalog.first_challenge(), &id("w1-d1-c1"));
        assert_eq!(catalog.next_after(&id("w1-d1-c2")), Some(&id("w1-d2-c1")));
        assert_eq!(catalog.next_after(&id("w2-d1-c1")), None);
        assert_eq!(catalog.position_of(&id("w1-d2-c1")), Some((1, 2)));
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        let err = CatalogDraft::new()
            .with_day(1, 1, &["a"])
            .with_day(1, 2, &["a"])
            .validate()
            .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateChallenge(id("a")));

        let err = CatalogDraft::new()
            .with_day(1, 1, &["a"])
            .with_day(1, 1, &["b"])
            .validate()
            .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateDay { week: 1, day: 1 });

        let err = CatalogDraft::new().with_day(1, 1, &[]).validate().unwrap_err();
        assert_eq!(err, CatalogError::Empty);

        let err = CatalogDraft::new().with_day(0, 1, &["a"]).validate().unwrap_err();
        assert_eq!(err, CatalogError::InvalidWeek);

        let err = CatalogDraft::new().with_day(1, 0, &["a"]).validate().unwrap_err();
        assert_eq!(err, CatalogError::InvalidDay { week: 1 });
    }

    #[test]
    fn rejects_malformed_ids() {
        let err = CatalogDraft::new()
            .with_day(1, 1, &["has space"])
            .validate()
            .unwrap_err();
        assert_eq!(err, CatalogError::InvalidChallengeId("has space".into()));
    }

    #[test]
    fn parses_json_with_bare_and_detailed_challenges() {
        let raw = r#"{
            "title": "SQL Mastery",
            "weeks": [
                { "week": 1, "title": "Basics", "days": [
                    { "day": 1, "challenges": ["w1-d1-c1", { "id": "w1-d1-c2", "xp": 25 }] }
                ]}
            ]
        }"#;
        let catalog = Catalog::from_json_str(raw).unwrap();

        assert_eq!(catalog.title(), Some("SQL Mastery"));
        assert_eq!(catalog.week(1).and_then(WeekPlan::title), Some("Basics"));
        assert_eq!(catalog.xp_for(&id("w1-d1-c1")), Some(DEFAULT_CHALLENGE_XP));
        assert_eq!(catalog.xp_for(&id("w1-d1-c2")), Some(25));
        assert_eq!(catalog.total_challenges(), 2);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Catalog::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
