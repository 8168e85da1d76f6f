mod catalog;
mod ids;
mod progress;
mod stats;

pub use catalog::{
    Catalog, CatalogDraft, CatalogError, ChallengeDraft, ChallengeEntry, DEFAULT_CHALLENGE_XP,
    DayDraft, DayPlan, WeekDraft, WeekPlan,
};
pub use ids::{ChallengeId, LearnerId, ParseIdError};
pub use progress::{AdvancePolicy, MarkOutcome, ProgressError, UserProgress};
pub use stats::{DayProgress, ProgressSummary, WeekProgress, rounded_percent};
