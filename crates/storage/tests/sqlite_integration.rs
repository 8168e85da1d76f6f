use chrono::Duration;
use course_core::model::{AdvancePolicy, Catalog, CatalogDraft, ChallengeId, LearnerId, UserProgress};
use course_core::time::fixed_now;
use storage::repository::{ProgressRepository, StorageError};
use storage::sqlite::SqliteRepository;

fn catalog() -> Catalog {
    CatalogDraft::new()
        .with_day(1, 1, &["w1-d1-c1", "w1-d1-c2"])
        .with_day(1, 2, &["w1-d2-c1"])
        .validate()
        .unwrap()
}

fn id(raw: &str) -> ChallengeId {
    ChallengeId::new(raw).unwrap()
}

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_completed_set_and_times() {
    let repo = repo("memdb_progress_roundtrip").await;
    let catalog = catalog();
    let learner = LearnerId::generate();

    assert!(repo.load(learner).await.unwrap().is_none());

    let mut progress = UserProgress::start(&catalog, fixed_now());
    let v1 = repo.save(learner, &progress, None).await.unwrap();
    assert_eq!(v1, 1);

    progress
        .mark_complete(
            &catalog,
            &id("w1-d1-c1"),
            fixed_now() + Duration::minutes(3),
            AdvancePolicy::default(),
        )
        .unwrap();
    progress
        .mark_complete(
            &catalog,
            &id("w1-d2-c1"),
            fixed_now() + Duration::minutes(9),
            AdvancePolicy::default(),
        )
        .unwrap();
    let v2 = repo.save(learner, &progress, Some(v1)).await.unwrap();
    assert_eq!(v2, 2);

    let stored = repo.load(learner).await.unwrap().expect("stored");
    assert_eq!(stored.version, 2);
    assert_eq!(stored.progress, progress);
    assert_eq!(stored.progress.current_challenge(), &id("w1-d1-c2"));
    assert_eq!(stored.progress.last_activity(), fixed_now() + Duration::minutes(9));
}

#[tokio::test]
async fn sqlite_rejects_stale_versions() {
    let repo = repo("memdb_progress_cas").await;
    let catalog = catalog();
    let learner = LearnerId::generate();
    let progress = UserProgress::start(&catalog, fixed_now());

    let v1 = repo.save(learner, &progress, None).await.unwrap();

    let err = repo.save(learner, &progress, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let v2 = repo.save(learner, &progress, Some(v1)).await.unwrap();
    let err = repo.save(learner, &progress, Some(v1)).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let stored = repo.load(learner).await.unwrap().unwrap();
    assert_eq!(stored.version, v2);
}

#[tokio::test]
async fn sqlite_update_replaces_completed_set() {
    let repo = repo("memdb_progress_replace").await;
    let catalog = catalog();
    let learner = LearnerId::generate();

    let mut progress = UserProgress::start(&catalog, fixed_now());
    progress
        .mark_complete(&catalog, &id("w1-d1-c1"), fixed_now(), AdvancePolicy::Always)
        .unwrap();
    let v1 = repo.save(learner, &progress, None).await.unwrap();

    let mut trimmed = UserProgress::start(&catalog, fixed_now());
    trimmed
        .mark_complete(&catalog, &id("w1-d1-c2"), fixed_now(), AdvancePolicy::Always)
        .unwrap();
    repo.save(learner, &trimmed, Some(v1)).await.unwrap();

    let stored = repo.load(learner).await.unwrap().unwrap();
    let ids: Vec<&str> = stored
        .progress
        .completed_challenges()
        .iter()
        .map(ChallengeId::as_str)
        .collect();
    assert_eq!(ids, vec!["w1-d1-c2"]);
}

#[tokio::test]
async fn sqlite_keeps_learners_apart() {
    let repo = repo("memdb_progress_learners").await;
    let catalog = catalog();
    let alice = LearnerId::generate();
    let bob = LearnerId::generate();

    let mut progress = UserProgress::start(&catalog, fixed_now());
    progress
        .mark_complete(&catalog, &id("w1-d1-c1"), fixed_now(), AdvancePolicy::default())
        .unwrap();
    repo.save(alice, &progress, None).await.unwrap();
    repo.save(bob, &UserProgress::start(&catalog, fixed_now()), None)
        .await
        .unwrap();

    let bob_record = repo.load(bob).await.unwrap().unwrap();
    assert_eq!(bob_record.progress.completed_count(), 0);
    assert_eq!(bob_record.version, 1);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = repo("memdb_progress_migrate").await;
    repo.migrate().await.expect("second migrate");
}
