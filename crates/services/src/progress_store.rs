use std::sync::Arc;

use course_core::model::{
    AdvancePolicy, Catalog, ChallengeId, DayProgress, LearnerId, MarkOutcome, ProgressError,
    ProgressSummary, UserProgress, WeekProgress,
};
use course_core::time::Clock;
use storage::repository::{ProgressRepository, StorageError, StoredProgress};

use crate::error::ProgressStoreError;
use crate::retry::{RetryPolicy, with_retry};

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Tunables for a `ProgressStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub advance: AdvancePolicy,
    pub retry: RetryPolicy,
    /// How many times a lost version race is merged and retried.
    pub max_conflict_retries: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            advance: AdvancePolicy::default(),
            retry: RetryPolicy::default(),
            max_conflict_retries: 3,
        }
    }
}

/// Result of `ProgressStore::import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    /// Challenges that were not completed here before.
    pub added: usize,
    /// Identifiers the catalog does not know, discarded before merging.
    pub dropped: usize,
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// One learner's progress, kept in memory and written through to a repository.
///
/// Reads are answered from the in-memory record. Mutations are computed on a
/// copy, persisted with a version check, and only then become visible; a
/// failed mutation leaves the store as it was.
pub struct ProgressStore {
    learner: LearnerId,
    catalog: Arc<Catalog>,
    repo: Arc<dyn ProgressRepository>,
    clock: Clock,
    settings: StoreSettings,
    progress: UserProgress,
    version: u64,
}

impl ProgressStore {
    /// Load the learner's record, creating a fresh one when none exists.
    ///
    /// A stored current challenge that is no longer part of the catalog is
    /// moved to the first incomplete challenge (in memory only).
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::PersistenceFailure` if the repository cannot
    /// be read or the new record cannot be written.
    pub async fn open(
        learner: LearnerId,
        catalog: Arc<Catalog>,
        repo: Arc<dyn ProgressRepository>,
        clock: Clock,
        settings: StoreSettings,
    ) -> Result<Self, ProgressStoreError> {
        let stored = match load(repo.as_ref(), learner, &settings.retry).await? {
            Some(stored) => stored,
            None => create(repo.as_ref(), learner, &catalog, clock, &settings.retry).await?,
        };

        let StoredProgress {
            mut progress,
            version,
        } = stored;
        if progress.repair_current(&catalog) {
            tracing::warn!(
                learner = %learner,
                challenge = %progress.current_challenge(),
                "current challenge was not in the catalog; moved to first incomplete"
            );
        }

        tracing::debug!(learner = %learner, version, "opened progress store");
        Ok(Self {
            learner,
            catalog,
            repo,
            clock,
            settings,
            progress,
            version,
        })
    }

    #[must_use]
    pub fn learner(&self) -> LearnerId {
        self.learner
    }

    #[must_use]
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Snapshot of the in-memory record.
    #[must_use]
    pub fn progress(&self) -> &UserProgress {
        &self.progress
    }

    /// Version of the record this store last read or wrote.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Mark `id` as completed and persist the change.
    ///
    /// Re-marking a completed challenge is a no-op and does not touch storage.
    ///
    /// # Errors
    ///
    /// - `ProgressStoreError::Progress(UnknownChallenge)` if `id` is not in the catalog.
    /// - `ProgressStoreError::PersistenceFailure` if the write did not go through.
    pub async fn mark_complete(
        &mut self,
        id: &ChallengeId,
    ) -> Result<MarkOutcome, ProgressStoreError> {
        let mut next = self.progress.clone();
        let outcome = next.mark_complete(
            &self.catalog,
            id,
            self.clock.now(),
            self.settings.advance,
        )?;

        if !outcome.is_new() {
            tracing::debug!(learner = %self.learner, challenge = %id, "challenge already completed");
            return Ok(outcome);
        }

        self.commit(next, Some(self.version)).await?;
        tracing::info!(
            learner = %self.learner,
            challenge = %id,
            current = %self.progress.current_challenge(),
            version = self.version,
            "challenge completed"
        );
        Ok(outcome)
    }

    /// Reload the stored record and merge it into memory.
    ///
    /// When the merged record differs from the stored one (local changes the
    /// repository has not seen) it is written back.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::PersistenceFailure` if loading or writing fails.
    pub async fn refresh(&mut self) -> Result<(), ProgressStoreError> {
        let remote = load(self.repo.as_ref(), self.learner, &self.settings.retry).await?;

        let Some(stored) = remote else {
            tracing::warn!(learner = %self.learner, "stored progress disappeared; recreating");
            let current = self.progress.clone();
            return self.commit(current, None).await;
        };

        let mut merged = self.progress.clone();
        merged.merge(&stored.progress, &self.catalog);

        if merged == stored.progress {
            self.progress = merged;
            self.version = stored.version;
            return Ok(());
        }
        self.commit(merged, Some(stored.version)).await
    }

    /// Merge another record of the same learner into this one, e.g. progress
    /// made anonymously before signing in.
    ///
    /// Identifiers unknown to the catalog are discarded. The merged record is
    /// persisted all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError::PersistenceFailure` if the write did not go through.
    pub async fn import(
        &mut self,
        mut other: UserProgress,
    ) -> Result<ImportReport, ProgressStoreError> {
        let dropped = other.retain_known(&self.catalog);
        if dropped > 0 {
            tracing::warn!(learner = %self.learner, dropped, "ignoring unknown challenges on import");
        }

        let mut next = self.progress.clone();
        next.merge(&other, &self.catalog);

        let added = next.completed_count() - self.progress.completed_count();
        if next == self.progress {
            return Ok(ImportReport { added, dropped });
        }

        self.commit(next, Some(self.version)).await?;
        tracing::info!(learner = %self.learner, added, version = self.version, "imported progress");
        Ok(ImportReport { added, dropped })
    }

    /// Persist `next` with a version check, merging and retrying on conflict.
    async fn commit(
        &mut self,
        mut next: UserProgress,
        mut expected: Option<u64>,
    ) -> Result<(), ProgressStoreError> {
        let repo = Arc::clone(&self.repo);
        let learner = self.learner;
        let retry = self.settings.retry;
        let mut conflicts = 0_u32;

        loop {
            let saved = with_retry(&retry, "save", || repo.save(learner, &next, expected)).await;
            match saved {
                Ok(version) => {
                    self.progress = next;
                    self.version = version;
                    return Ok(());
                }
                Err(err) if err.is_conflict() && conflicts < self.settings.max_conflict_retries => {
                    conflicts += 1;
                    tracing::warn!(
                        learner = %learner,
                        attempt = conflicts,
                        "progress changed elsewhere; merging and retrying"
                    );
                    match load(repo.as_ref(), learner, &retry).await? {
                        Some(remote) => {
                            next.merge(&remote.progress, &self.catalog);
                            expected = Some(remote.version);
                        }
                        None => expected = None,
                    }
                }
                Err(err) if err.is_conflict() => {
                    tracing::error!(learner = %learner, conflicts, "gave up after repeated conflicts");
                    return Err(ProgressStoreError::PersistenceFailure {
                        attempts: conflicts + 1,
                        source: StorageError::Conflict,
                    });
                }
                Err(err) => {
                    tracing::error!(learner = %learner, error = %err, "failed to persist progress");
                    return Err(err);
                }
            }
        }
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `ProgressError::DayNotFound` if the catalog has no such day.
    pub fn day_progress(&self, week: u32, day: u32) -> Result<DayProgress, ProgressError> {
        self.progress.day_progress(&self.catalog, week, day)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::WeekNotFound` if the catalog has no such week.
    pub fn week_progress(&self, week: u32) -> Result<WeekProgress, ProgressError> {
        self.progress.week_progress(&self.catalog, week)
    }

    #[must_use]
    pub fn overall_percent(&self) -> u8 {
        self.progress.overall_percent(&self.catalog)
    }

    #[must_use]
    pub fn is_completed(&self, id: &ChallengeId) -> bool {
        self.progress.is_completed(id)
    }

    /// Completed challenges that are part of the catalog.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.progress.completed_in_catalog(&self.catalog)
    }

    #[must_use]
    pub fn current_challenge(&self) -> &ChallengeId {
        self.progress.current_challenge()
    }

    #[must_use]
    pub fn total_xp(&self) -> u32 {
        self.progress.total_xp(&self.catalog)
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        self.progress.summary(&self.catalog)
    }
}

async fn load(
    repo: &dyn ProgressRepository,
    learner: LearnerId,
    retry: &RetryPolicy,
) -> Result<Option<StoredProgress>, ProgressStoreError> {
    with_retry(retry, "load", || repo.load(learner)).await
}

async fn create(
    repo: &dyn ProgressRepository,
    learner: LearnerId,
    catalog: &Catalog,
    clock: Clock,
    retry: &RetryPolicy,
) -> Result<StoredProgress, ProgressStoreError> {
    let progress = UserProgress::start(catalog, clock.now());
    match with_retry(retry, "create", || repo.save(learner, &progress, None)).await {
        Ok(version) => {
            tracing::info!(learner = %learner, "created progress record");
            Ok(StoredProgress { progress, version })
        }
        // Another device created the record first; use theirs.
        Err(err) if err.is_conflict() => load(repo, learner, retry)
            .await?
            .ok_or(ProgressStoreError::PersistenceFailure {
                attempts: 1,
                source: StorageError::Conflict,
            }),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::model::CatalogDraft;
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn id(raw: &str) -> ChallengeId {
        ChallengeId::new(raw).unwrap()
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            CatalogDraft::new()
                .with_day(1, 1, &["w1-d1-c1", "w1-d1-c2"])
                .with_day(1, 2, &["w1-d2-c1"])
                .validate()
                .unwrap(),
        )
    }

    fn settings(advance: AdvancePolicy) -> StoreSettings {
        StoreSettings {
            advance,
            retry: RetryPolicy::immediate(3),
            max_conflict_retries: 3,
        }
    }

    async fn open_with(
        repo: &InMemoryRepository,
        learner: LearnerId,
        clock: Clock,
        advance: AdvancePolicy,
    ) -> ProgressStore {
        ProgressStore::open(
            learner,
            catalog(),
            Arc::new(repo.clone()),
            clock,
            settings(advance),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn open_creates_and_persists_fresh_record() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::generate();
        let store = open_with(&repo, learner, fixed_clock(), AdvancePolicy::default()).await;

        assert_eq!(store.learner(), learner);
        assert_eq!(store.version(), 1);
        assert_eq!(store.current_challenge(), &id("w1-d1-c1"));
        assert_eq!(store.overall_percent(), 0);

        let stored = repo.load(learner).await.unwrap().unwrap();
        assert_eq!(&stored.progress, store.progress());
    }

    #[tokio::test]
    async fn mark_complete_persists_and_updates_reads() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::generate();
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(10));
        let mut store = open_with(&repo, learner, clock, AdvancePolicy::OnlyIfCurrent).await;

        let outcome = store.mark_complete(&id("w1-d1-c1")).await.unwrap();
        assert_eq!(
            outcome,
            MarkOutcome::Completed {
                advanced_to: Some(id("w1-d1-c2"))
            }
        );

        let day = store.day_progress(1, 1).unwrap();
        assert_eq!(
            day,
            DayProgress {
                day: 1,
                week: 1,
                total_challenges: 2,
                completed_challenges: 1,
            }
        );
        assert_eq!(store.total_xp(), 10);
        assert_eq!(store.version(), 2);

        let stored = repo.load(learner).await.unwrap().unwrap();
        assert!(stored.progress.is_completed(&id("w1-d1-c1")));
        assert_eq!(stored.progress.last_activity(), fixed_now() + Duration::minutes(10));
    }

    #[tokio::test]
    async fn re_marking_does_not_write() {
        let repo = InMemoryRepository::new();
        let mut store = open_with(
            &repo,
            LearnerId::generate(),
            fixed_clock(),
            AdvancePolicy::default(),
        )
        .await;

        store.mark_complete(&id("w1-d1-c1")).await.unwrap();
        let before = store.progress().clone();
        let version = store.version();

        let outcome = store.mark_complete(&id("w1-d1-c1")).await.unwrap();
        assert_eq!(outcome, MarkOutcome::AlreadyCompleted);
        assert_eq!(store.progress(), &before);
        assert_eq!(store.version(), version);
    }

    #[tokio::test]
    async fn unknown_challenge_is_rejected_without_side_effects() {
        let repo = InMemoryRepository::new();
        let mut store = open_with(
            &repo,
            LearnerId::generate(),
            fixed_clock(),
            AdvancePolicy::default(),
        )
        .await;
        let before = store.progress().clone();

        let err = store.mark_complete(&id("w7-d1-c1")).await.unwrap_err();
        assert!(matches!(
            err,
            ProgressStoreError::Progress(ProgressError::UnknownChallenge(_))
        ));
        assert_eq!(store.progress(), &before);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn advance_policies_differ_for_non_current_challenges() {
        let repo = InMemoryRepository::new();

        let mut only_current = open_with(
            &repo,
            LearnerId::generate(),
            fixed_clock(),
            AdvancePolicy::OnlyIfCurrent,
        )
        .await;
        only_current.mark_complete(&id("w1-d1-c2")).await.unwrap();
        assert_eq!(only_current.current_challenge(), &id("w1-d1-c1"));

        let mut always = open_with(
            &repo,
            LearnerId::generate(),
            fixed_clock(),
            AdvancePolicy::Always,
        )
        .await;
        always.mark_complete(&id("w1-d1-c2")).await.unwrap();
        assert_eq!(always.current_challenge(), &id("w1-d2-c1"));
    }

    #[tokio::test]
    async fn open_repairs_stale_current_challenge() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::generate();
        let stale =
            UserProgress::from_persisted([id("w1-d1-c1")], id("w0-retired"), fixed_now(), fixed_now())
                .unwrap();
        repo.save(learner, &stale, None).await.unwrap();

        let store = open_with(&repo, learner, fixed_clock(), AdvancePolicy::default()).await;
        assert_eq!(store.current_challenge(), &id("w1-d1-c2"));
        assert_eq!(store.completed_count(), 1);
    }

    #[tokio::test]
    async fn import_merges_and_drops_unknown_ids() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::generate();
        let mut store = open_with(&repo, learner, fixed_clock(), AdvancePolicy::default()).await;
        store.mark_complete(&id("w1-d1-c1")).await.unwrap();

        let local = UserProgress::from_persisted(
            [id("w1-d1-c1"), id("w1-d2-c1"), id("bonus-1")],
            id("w1-d1-c2"),
            fixed_now() - Duration::days(2),
            fixed_now(),
        )
        .unwrap();

        let report = store.import(local).await.unwrap();
        assert_eq!(report, ImportReport { added: 1, dropped: 1 });
        assert_eq!(store.completed_count(), 2);
        assert_eq!(store.progress().started_at(), fixed_now() - Duration::days(2));

        let stored = repo.load(learner).await.unwrap().unwrap();
        assert_eq!(&stored.progress, store.progress());
        assert!(!stored.progress.is_completed(&id("bonus-1")));
    }

    #[tokio::test]
    async fn refresh_picks_up_changes_from_another_device() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::generate();
        let mut laptop = open_with(&repo, learner, fixed_clock(), AdvancePolicy::default()).await;
        let mut phone = open_with(&repo, learner, fixed_clock(), AdvancePolicy::default()).await;

        phone.mark_complete(&id("w1-d2-c1")).await.unwrap();
        assert!(!laptop.is_completed(&id("w1-d2-c1")));

        laptop.refresh().await.unwrap();
        assert!(laptop.is_completed(&id("w1-d2-c1")));
        assert_eq!(laptop.version(), phone.version());
    }
}
