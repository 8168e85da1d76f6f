use std::sync::Arc;

use course_core::model::{Catalog, LearnerId};
use storage::remote::RemoteConfig;
use storage::repository::Storage;

use crate::Clock;
use crate::error::{CourseServicesError, ProgressStoreError};
use crate::progress_store::{ProgressStore, StoreSettings};

/// Assembles the catalog, a storage backend and store settings, and hands out
/// per-learner `ProgressStore`s.
#[derive(Clone)]
pub struct CourseServices {
    catalog: Arc<Catalog>,
    storage: Storage,
    clock: Clock,
    settings: StoreSettings,
}

impl CourseServices {
    #[must_use]
    pub fn new(catalog: Catalog, storage: Storage) -> Self {
        Self {
            catalog: Arc::new(catalog),
            storage,
            clock: Clock::default(),
            settings: StoreSettings::default(),
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `CourseServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, catalog: Catalog) -> Result<Self, CourseServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(catalog, storage))
    }

    /// Build services backed by the remote progress service.
    ///
    /// # Errors
    ///
    /// Returns `CourseServicesError` if the HTTP client cannot be built.
    pub fn new_remote(config: RemoteConfig, catalog: Catalog) -> Result<Self, CourseServicesError> {
        let storage = Storage::remote(config)?;
        Ok(Self::new(catalog, storage))
    }

    #[must_use]
    pub fn in_memory(catalog: Catalog) -> Self {
        Self::new(catalog, Storage::in_memory())
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    /// Open the progress store for `learner`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressStoreError` if the learner's record cannot be loaded or created.
    pub async fn open_store(&self, learner: LearnerId) -> Result<ProgressStore, ProgressStoreError> {
        ProgressStore::open(
            learner,
            Arc::clone(&self.catalog),
            Arc::clone(&self.storage.progress),
            self.clock,
            self.settings,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{AdvancePolicy, CatalogDraft, ChallengeId};
    use course_core::time::fixed_clock;

    #[tokio::test]
    async fn stores_for_the_same_learner_share_storage() {
        let catalog = CatalogDraft::new()
            .with_day(1, 1, &["w1-d1-c1", "w1-d1-c2"])
            .validate()
            .unwrap();
        let services = CourseServices::in_memory(catalog)
            .with_clock(fixed_clock())
            .with_settings(StoreSettings {
                advance: AdvancePolicy::Always,
                ..StoreSettings::default()
            });
        let learner = LearnerId::generate();

        let mut first = services.open_store(learner).await.unwrap();
        first
            .mark_complete(&ChallengeId::new("w1-d1-c1").unwrap())
            .await
            .unwrap();

        let second = services.open_store(learner).await.unwrap();
        assert_eq!(second.completed_count(), 1);
        assert_eq!(second.overall_percent(), 50);
        assert_eq!(second.settings().advance, AdvancePolicy::Always);
    }
}
