use chrono::Duration;
use storage::repository::{
    AccountRepository, CompletionRepository, LedgerPersistence, SessionRepository, StorageError,
};
use storage::sqlite::SqliteRepository;
use training_core::model::{
    AccountSnapshot, CompletionDraft, ExerciseDraft, IdempotencyKey, NewCompletion, NewSession,
    ProgressionAccount, Session, SessionDraft, SetDraft, UserId, Weight,
};
use training_core::progression::CompletionDelta;
use training_core::time::fixed_now;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn seed(repo: &SqliteRepository, user: u64) -> Session {
    repo.create_account(&ProgressionAccount::new(UserId::new(user), fixed_now()))
        .await
        .unwrap();
    let draft = SessionDraft {
        name: "Legs".into(),
        description: Some("heavy".into()),
        plan: vec![ExerciseDraft::new("Squat", "legs", vec![SetDraft::strength(5, 100.0, false)])],
    };
    repo.insert_session(NewSession::from_draft(UserId::new(user), draft, fixed_now()).unwrap())
        .await
        .unwrap()
}

fn completion(
    session: &Session,
    sets: usize,
    weight: f64,
    key: Option<IdempotencyKey>,
) -> NewCompletion {
    let content = CompletionDraft::new(
        45,
        "felt good",
        vec![ExerciseDraft::new("Squat", "legs", vec![SetDraft::strength(10, weight, true); sets])],
    )
    .validate()
    .unwrap();
    NewCompletion::new(session.user_id(), session.id(), fixed_now(), content, key)
}

#[tokio::test]
async fn sqlite_migrate_is_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn sqlite_accounts_and_sessions_roundtrip() {
    let repo = connect("memdb_accounts_sessions").await;
    let mut session = seed(&repo, 1).await;

    let err = repo
        .create_account(&ProgressionAccount::new(UserId::new(1), fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let fetched = repo.get_session(session.id()).await.unwrap().unwrap();
    assert_eq!(fetched, session);

    session.soft_delete(fixed_now() + Duration::hours(1));
    repo.save_session(&session).await.unwrap();
    assert!(repo.list_active_sessions(UserId::new(1)).await.unwrap().is_empty());
    assert!(repo.get_session(session.id()).await.unwrap().unwrap().is_deleted());

    let orphan =
        NewSession::from_draft(UserId::new(99), SessionDraft::named("x"), fixed_now()).unwrap();
    assert!(matches!(
        repo.insert_session(orphan).await.unwrap_err(),
        StorageError::NotFound
    ));
}

#[tokio::test]
async fn sqlite_append_updates_ledger_and_account_together() {
    let repo = connect("memdb_append").await;
    let session = seed(&repo, 1).await;

    let new = completion(&session, 3, 50.0, None);
    let credit = CompletionDelta::of(&new.content).credit();
    let write = repo.append_completion(new, &credit, fixed_now()).await.unwrap();

    assert_eq!(write.account_before, AccountSnapshot::default());
    assert_eq!(write.account_after.xp(), 30);
    assert_eq!(write.account_after.stats().total_workout_time, 45);
    assert_eq!(
        write.account_after.stats().total_weight_lifted,
        Weight::from_millis(1_500_000)
    );

    let stored = repo.get_account(UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored, write.account_after);

    let ledger = repo.session_ledger(session.id()).await.unwrap();
    assert_eq!(ledger.records(), &[write.completion.clone()]);
}

#[tokio::test]
async fn sqlite_append_rejects_deleted_or_foreign_sessions() {
    let repo = connect("memdb_append_rejects").await;
    let mut session = seed(&repo, 1).await;
    repo.create_account(&ProgressionAccount::new(UserId::new(2), fixed_now()))
        .await
        .unwrap();

    let mut foreign = completion(&session, 1, 10.0, None);
    foreign.user_id = UserId::new(2);
    let credit = CompletionDelta::of(&foreign.content).credit();
    assert!(matches!(
        repo.append_completion(foreign, &credit, fixed_now()).await.unwrap_err(),
        StorageError::NotFound
    ));

    session.soft_delete(fixed_now());
    repo.save_session(&session).await.unwrap();
    let new = completion(&session, 1, 10.0, None);
    let credit = CompletionDelta::of(&new.content).credit();
    assert!(matches!(
        repo.append_completion(new, &credit, fixed_now()).await.unwrap_err(),
        StorageError::NotFound
    ));

    assert_eq!(repo.get_account(UserId::new(1)).await.unwrap().unwrap().xp(), 0);
    assert_eq!(repo.get_account(UserId::new(2)).await.unwrap().unwrap().xp(), 0);
    assert!(repo.session_ledger(session.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_duplicate_idempotency_key_is_conflict() {
    let repo = connect("memdb_idempotency").await;
    let session = seed(&repo, 1).await;
    let key = IdempotencyKey::generate();

    let new = completion(&session, 1, 10.0, Some(key));
    let credit = CompletionDelta::of(&new.content).credit();
    let first = repo.append_completion(new.clone(), &credit, fixed_now()).await.unwrap();

    assert!(matches!(
        repo.append_completion(new, &credit, fixed_now()).await.unwrap_err(),
        StorageError::Conflict
    ));
    assert_eq!(
        repo.find_by_idempotency_key(UserId::new(1), key).await.unwrap(),
        Some(first.completion)
    );
    assert_eq!(repo.get_account(UserId::new(1)).await.unwrap().unwrap().xp(), 10);
}

#[tokio::test]
async fn sqlite_replace_and_remove_respect_revision() {
    let repo = connect("memdb_revisions").await;
    let session = seed(&repo, 1).await;

    let new = completion(&session, 3, 50.0, None);
    let credit = CompletionDelta::of(&new.content).credit();
    let original = repo
        .append_completion(new, &credit, fixed_now())
        .await
        .unwrap()
        .completion;

    let content = CompletionDraft::new(
        60,
        "more",
        vec![ExerciseDraft::new("Squat", "legs", vec![SetDraft::strength(10, 60.0, true); 5])],
    )
    .validate()
    .unwrap();
    let revised = original.revised(content, fixed_now() + Duration::minutes(5));
    let diff = revised.delta().diff_from(&original.delta());
    let write = repo
        .replace_completion(&revised, 0, &diff, fixed_now())
        .await
        .unwrap();
    assert_eq!(write.account_after.xp(), 50);
    assert_eq!(write.account_after.total_sessions_completed(), 1);
    assert_eq!(
        repo.get_completion(original.id()).await.unwrap(),
        Some(revised.clone())
    );

    // The original (revision 0) is stale now.
    assert!(matches!(
        repo.replace_completion(&revised, 0, &diff, fixed_now())
            .await
            .unwrap_err(),
        StorageError::Conflict
    ));
    assert!(matches!(
        repo.remove_completion(&original, &original.delta().debit(), fixed_now())
            .await
            .unwrap_err(),
        StorageError::Conflict
    ));

    let removed = repo
        .remove_completion(&revised, &revised.delta().debit(), fixed_now())
        .await
        .unwrap();
    assert_eq!(removed.account_after.snapshot(), AccountSnapshot::default());
    assert!(repo.get_completion(original.id()).await.unwrap().is_none());
    assert!(matches!(
        repo.remove_completion(&revised, &revised.delta().debit(), fixed_now())
            .await
            .unwrap_err(),
        StorageError::NotFound
    ));
}

#[tokio::test]
async fn sqlite_calendar_window_is_half_open() {
    let repo = connect("memdb_calendar").await;
    let session = seed(&repo, 1).await;

    for hours in [0, 24, 48] {
        let mut new = completion(&session, 1, 10.0, None);
        new.completed_at = fixed_now() + Duration::hours(hours);
        let credit = CompletionDelta::of(&new.content).credit();
        repo.append_completion(new, &credit, fixed_now()).await.unwrap();
    }

    let found = repo
        .completions_between(
            UserId::new(1),
            fixed_now(),
            fixed_now() + Duration::hours(48),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found[0].completed_at() < found[1].completed_at());
}

#[tokio::test]
async fn sqlite_snapshot_and_overwrite_totals() {
    let repo = connect("memdb_overwrite").await;
    let session = seed(&repo, 1).await;

    let new = completion(&session, 2, 25.0, None);
    let credit = CompletionDelta::of(&new.content).credit();
    repo.append_completion(new, &credit, fixed_now()).await.unwrap();

    let snapshot = repo.ledger_snapshot(UserId::new(1)).await.unwrap();
    assert_eq!(snapshot.completions.len(), 1);
    assert_eq!(snapshot.account.version(), 1);

    let err = repo
        .overwrite_totals(UserId::new(1), 0, &AccountSnapshot::default(), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let account = repo
        .overwrite_totals(UserId::new(1), 1, &AccountSnapshot::default(), fixed_now())
        .await
        .unwrap();
    assert_eq!(account.xp(), 0);
    assert_eq!(account.version(), 2);
    assert_eq!(repo.get_account(UserId::new(1)).await.unwrap(), Some(account));

    assert!(matches!(
        repo.ledger_snapshot(UserId::new(9)).await.unwrap_err(),
        StorageError::NotFound
    ));
}

#[tokio::test]
async fn sqlite_weight_total_saturates_instead_of_turning_real() {
    let repo = connect("memdb_weight_ceiling").await;
    let session = seed(&repo, 1).await;

    let huge = completion(&session, 1, 10.0, None);
    let mut credit = CompletionDelta::of(&huge.content).credit();
    credit.weight_millis = i64::MAX - 10;
    repo.append_completion(huge, &credit, fixed_now()).await.unwrap();

    for _ in 0..2 {
        let next = completion(&session, 3, 50.0, None);
        let credit = CompletionDelta::of(&next.content).credit();
        let write = repo.append_completion(next, &credit, fixed_now()).await.unwrap();
        assert_eq!(
            write.account_after.stats().total_weight_lifted.millis(),
            i64::MAX.unsigned_abs()
        );
    }

    let stored = repo.get_account(UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored.total_sessions_completed(), 3);
    assert_eq!(stored.xp(), 70);
}

#[tokio::test]
async fn sqlite_stale_save_cannot_revive_deleted_session() {
    let repo = connect("memdb_stale_session").await;
    let session = seed(&repo, 1).await;
    let mut stale = session.clone();

    let mut deleted = session;
    deleted.soft_delete(fixed_now() + Duration::minutes(1));
    repo.save_session(&deleted).await.unwrap();

    stale
        .edit(SessionDraft::named("Legs v2"), fixed_now() + Duration::minutes(2))
        .unwrap();
    assert!(matches!(
        repo.save_session(&stale).await.unwrap_err(),
        StorageError::NotFound
    ));

    let stored = repo.get_session(deleted.id()).await.unwrap().unwrap();
    assert!(stored.is_deleted());
    assert_eq!(stored.name(), "Legs");
    assert!(repo.list_active_sessions(UserId::new(1)).await.unwrap().is_empty());
}
