use chrono::{Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use planner_core::db::establish_connection;
use planner_core::error::CoreError;
use planner_core::materialization::MaterializationManager;
use planner_core::models::*;
use planner_core::repository::{
    ExceptionRepository, MaterializationRepository, OccurrenceRepository, OccurrenceStore,
    SqliteRepository, TaskRepository,
};
use planner_core::rule::RecurrenceRule;
use planner_core::timezone::utc_to_local;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper function to create a test database
async fn setup_test_db() -> (SqliteRepository, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    let repository = SqliteRepository::new(pool, MaterializationManager::with_defaults());
    (repository, temp_dir)
}

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// January 2030, far enough ahead that creating a task never materializes into it.
fn january_2030() -> Window {
    Window::dates(date(2030, 1, 1), date(2030, 1, 31)).unwrap()
}

/// Helper function to create a recurring task anchored on 2030-01-07 09:00 (a Monday)
async fn create_recurring_task(repo: &SqliteRepository, rule: RecurrenceRule) -> Task {
    repo.add_task(NewTaskData {
        title: "Stand-up".to_string(),
        rule: Some(rule),
        recurrence_start: Some(Anchor::from(at(2030, 1, 7, 9))),
        ..Default::default()
    })
    .await
    .expect("Failed to create test task")
}

async fn stored(repo: &SqliteRepository, task_id: uuid::Uuid) -> Vec<TaskOccurrence> {
    repo.load_occurrences(task_id, &january_2030()).await.unwrap()
}

#[tokio::test]
async fn test_task_round_trip() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::weekly([Weekday::Mon, Weekday::Wed]).every(2)).await;

    let found = repo.find_task_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(found.title, "Stand-up");
    assert_eq!(found.rule, task.rule);
    assert_eq!(found.recurrence_start, Some(Anchor::from(at(2030, 1, 7, 9))));
    assert_eq!(found.timezone, "UTC");

    assert_eq!(repo.find_recurring_tasks().await.unwrap().len(), 1);
    let prefix = &task.id.to_string()[..8];
    assert_eq!(repo.find_task_by_id_prefix(prefix).await.unwrap().id, task.id);
}

#[tokio::test]
async fn test_add_task_validation() {
    let (repo, _temp_dir) = setup_test_db().await;

    let blank = repo
        .add_task(NewTaskData {
            title: "   ".to_string(),
            ..Default::default()
        })
        .await;
    assert!(matches!(blank, Err(CoreError::InvalidInput(_))));

    let bad_zone = repo
        .add_task(NewTaskData {
            title: "Call".to_string(),
            timezone: Some("Nowhere/Special".to_string()),
            ..Default::default()
        })
        .await;
    assert!(matches!(bad_zone, Err(CoreError::InvalidTimezone(_))));

    let no_anchor = repo
        .add_task(NewTaskData {
            title: "Call".to_string(),
            rule: Some(RecurrenceRule::daily()),
            ..Default::default()
        })
        .await;
    assert!(matches!(no_anchor, Err(CoreError::InvalidRule(_))));

    let expired = repo
        .add_task(NewTaskData {
            title: "Call".to_string(),
            rule: Some(RecurrenceRule::daily().until(date(2001, 1, 1))),
            due_at: Some(at(2000, 1, 1, 9)),
            ..Default::default()
        })
        .await;
    assert!(matches!(expired, Err(CoreError::InvalidRule(_))));

    let overdue = repo
        .add_task(NewTaskData {
            title: "Call".to_string(),
            due_at: Some(at(2000, 1, 1, 9)),
            ..Default::default()
        })
        .await;
    assert!(matches!(overdue, Err(CoreError::InvalidInput(msg)) if msg.contains("past")));

    assert!(repo.find_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(10)).await;
    assert!(stored(&repo, task.id).await.is_empty());

    let first = repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    assert_eq!(first.inserts(), 10);

    let rows = stored(&repo, task.id).await;
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].scheduled_at, at(2030, 1, 7, 9));
    assert_eq!(rows[9].scheduled_at, at(2030, 1, 16, 9));

    let second = repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_shrinking_count_keeps_completed_history() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(10)).await;
    repo.reconcile_task(task.id, &january_2030()).await.unwrap();

    repo.complete_occurrence(task.id, at(2030, 1, 8, 9)).await.unwrap();
    repo.complete_occurrence(task.id, at(2030, 1, 14, 9)).await.unwrap();

    repo.update_task_rule(task.id, Some(RecurrenceRule::daily().count(5)), None)
        .await
        .unwrap();
    let set = repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    assert_eq!(set.deletes(), 4);
    assert_eq!(set.updates(), 1);

    let rows = stored(&repo, task.id).await;
    assert_eq!(rows.len(), 6);
    let orphaned: Vec<_> = rows.iter().filter(|o| o.orphaned).collect();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].scheduled_at, at(2030, 1, 14, 9));
    assert_eq!(orphaned[0].status, TaskStatus::Completed);
    assert!(orphaned[0].completed_at.is_some());

    assert!(repo.reconcile_task(task.id, &january_2030()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_skip_occurrence_is_not_resurrected() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::weekly([Weekday::Mon, Weekday::Wed]).count(4)).await;
    repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    assert_eq!(stored(&repo, task.id).await.len(), 4);

    let exception = repo.skip_occurrence(task.id, date(2030, 1, 9)).await.unwrap();
    assert_eq!(exception.exception_date, date(2030, 1, 9));

    assert!(repo.reconcile_task(task.id, &january_2030()).await.unwrap().is_empty());
    let times: Vec<_> = stored(&repo, task.id).await.iter().map(|o| o.scheduled_at).collect();
    assert_eq!(times, vec![at(2030, 1, 7, 9), at(2030, 1, 14, 9), at(2030, 1, 16, 9)]);

    assert_eq!(
        repo.load_exceptions(task.id).await.unwrap().into_iter().collect::<Vec<_>>(),
        vec![date(2030, 1, 9)]
    );

    // Skipping the same date twice keeps a single exception.
    repo.skip_occurrence(task.id, date(2030, 1, 9)).await.unwrap();
    assert_eq!(repo.find_exceptions(task.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_removing_exception_restores_occurrence() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(3)).await;
    repo.add_exception(task.id, date(2030, 1, 8)).await.unwrap();

    repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    assert_eq!(stored(&repo, task.id).await.len(), 2);

    repo.remove_exception(task.id, date(2030, 1, 8)).await.unwrap();
    let set = repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    assert_eq!(set.inserts(), 1);
    assert_eq!(stored(&repo, task.id).await.len(), 3);

    let missing = repo.remove_exception(task.id, date(2030, 1, 8)).await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_complete_materializes_on_demand() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily()).await;

    let done = repo.complete_occurrence(task.id, at(2030, 1, 20, 9)).await.unwrap();
    assert!(done.is_completed());
    let rows = stored(&repo, task.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, done.id);
    assert_eq!(rows[0].status, TaskStatus::Completed);

    let reopened = repo.reopen_occurrence(task.id, at(2030, 1, 20, 9)).await.unwrap();
    assert_eq!(reopened.status, TaskStatus::Pending);
    assert_eq!(reopened.completed_at, None);
    assert_eq!(reopened.id, done.id);

    let not_generated = repo.complete_occurrence(task.id, at(2030, 1, 20, 10)).await;
    assert!(matches!(not_generated, Err(CoreError::NotFound(_))));
    let before_anchor = repo.complete_occurrence(task.id, at(2030, 1, 1, 9)).await;
    assert!(matches!(before_anchor, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_override_survives_reconciliation() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(3)).await;
    repo.reconcile_task(task.id, &january_2030()).await.unwrap();

    repo.override_occurrence(
        task.id,
        at(2030, 1, 8, 9),
        OccurrenceOverride {
            title: Some(Some("Stand-up (remote)".to_string())),
            due_at: Some(Some(at(2030, 1, 8, 11))),
        },
    )
    .await
    .unwrap();
    assert!(repo.reconcile_task(task.id, &january_2030()).await.unwrap().is_empty());

    let effective = repo.find_effective_occurrences(task.id, &january_2030()).await.unwrap();
    assert_eq!(effective.len(), 3);
    assert_eq!(effective[1].title, "Stand-up (remote)");
    assert_eq!(effective[1].due_at, at(2030, 1, 8, 11));
    assert_eq!(effective[0].title, "Stand-up");

    let cleared = repo
        .override_occurrence(
            task.id,
            at(2030, 1, 8, 9),
            OccurrenceOverride {
                title: Some(None),
                due_at: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.override_title, None);
    assert_eq!(cleared.override_due_at, Some(at(2030, 1, 8, 11)));
}

#[tokio::test]
async fn test_invalid_rule_update_leaves_state_untouched() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(3)).await;
    repo.reconcile_task(task.id, &january_2030()).await.unwrap();

    let result = repo
        .update_task_rule(task.id, Some(RecurrenceRule::daily().every(0)), None)
        .await;
    assert!(matches!(result, Err(CoreError::InvalidRule(_))));

    let found = repo.find_task_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(found.rule, Some(RecurrenceRule::daily().count(3)));
    assert_eq!(stored(&repo, task.id).await.len(), 3);
}

#[tokio::test]
async fn test_concurrent_reconciliation_of_one_task() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(10)).await;
    let window = january_2030();

    let (a, b) = tokio::join!(repo.reconcile_task(task.id, &window), repo.reconcile_task(task.id, &window));
    let total = a.unwrap().inserts() + b.unwrap().inserts();
    assert_eq!(total, 10);
    assert_eq!(stored(&repo, task.id).await.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_tasks_reconcile_concurrently() {
    let (repo, _temp_dir) = setup_test_db().await;
    let repo = Arc::new(repo);
    let two_years = Window::dates(date(2030, 1, 1), date(2031, 12, 31)).unwrap();

    let mut ids = Vec::new();
    for _ in 0..16 {
        ids.push(create_recurring_task(&repo, RecurrenceRule::weekly([Weekday::Mon])).await.id);
    }

    // Every round writes to all sixteen tasks at once through the shared pool.
    for round in 0..5 {
        let skipped = date(2030, 1, 7) + Duration::weeks(round);
        let handles: Vec<_> = ids
            .iter()
            .map(|&task_id| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.reconcile_task(task_id, &two_years).await?;
                    repo.skip_occurrence(task_id, skipped).await?;
                    Ok::<_, CoreError>(())
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task panicked").expect("write failed under contention");
        }
    }

    // 104 Mondays between 2030-01-07 and 2031-12-29, five of them skipped.
    for task_id in ids {
        assert_eq!(repo.load_occurrences(task_id, &two_years).await.unwrap().len(), 99);
        assert!(repo.reconcile_task(task_id, &two_years).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_reconcile_horizons_uses_each_task_timezone() {
    let (repo, _temp_dir) = setup_test_db().await;

    for timezone in ["Pacific/Auckland", "Pacific/Honolulu"] {
        let local_now = utc_to_local(Utc::now(), timezone).unwrap();
        let start = (local_now - Duration::days(10)).date().and_hms_opt(12, 0, 0).unwrap();
        let task = repo
            .add_task(NewTaskData {
                title: "Water plants".to_string(),
                rule: Some(RecurrenceRule::daily()),
                recurrence_start: Some(Anchor::from(start)),
                timezone: Some(timezone.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let window = repo.default_window(&task).unwrap();
        assert!(!repo.load_occurrences(task.id, &window).await.unwrap().is_empty());
    }

    // Creating a task reconciles its own horizon; a batch pass must pick the same windows.
    let summary = repo.reconcile_horizons().await.unwrap();
    assert_eq!(summary.tasks_processed, 2);
    assert_eq!(summary.tasks_with_errors, 0);
    assert_eq!(summary.inserted + summary.updated + summary.deleted, 0);
}

#[tokio::test]
async fn test_reconcile_all_and_rule_removal() {
    let (repo, _temp_dir) = setup_test_db().await;
    let daily = create_recurring_task(&repo, RecurrenceRule::daily().count(4)).await;
    let weekly = create_recurring_task(&repo, RecurrenceRule::weekly([Weekday::Fri])).await;
    repo.add_task(NewTaskData {
        title: "One-off".to_string(),
        due_at: Some(at(2030, 1, 2, 12)),
        ..Default::default()
    })
    .await
    .unwrap();

    let summary = repo.reconcile_all(&january_2030()).await.unwrap();
    assert_eq!(summary.tasks_processed, 2);
    assert_eq!(summary.inserted, 4 + 3);
    assert_eq!(summary.tasks_with_errors, 0);

    repo.complete_occurrence(weekly.id, at(2030, 1, 11, 9)).await.unwrap();
    repo.update_task_rule(weekly.id, None, None).await.unwrap();
    let summary = repo.reconcile_all(&january_2030()).await.unwrap();
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.updated, 1);

    let remaining = stored(&repo, weekly.id).await;
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].orphaned);
    assert_eq!(stored(&repo, daily.id).await.len(), 4);
}

#[tokio::test]
async fn test_delete_task_cascades() {
    let (repo, _temp_dir) = setup_test_db().await;
    let task = create_recurring_task(&repo, RecurrenceRule::daily().count(3)).await;
    repo.reconcile_task(task.id, &january_2030()).await.unwrap();
    repo.add_exception(task.id, date(2030, 1, 20)).await.unwrap();

    repo.delete_task(task.id).await.unwrap();
    assert!(repo.find_task_by_id(task.id).await.unwrap().is_none());
    assert!(stored(&repo, task.id).await.is_empty());
    assert!(repo.find_exceptions(task.id).await.unwrap().is_empty());

    let again = repo.delete_task(task.id).await;
    assert!(matches!(again, Err(CoreError::NotFound(_))));
    let reconcile_missing = repo.reconcile_task(task.id, &january_2030()).await;
    assert!(matches!(reconcile_missing, Err(CoreError::NotFound(_))));
}
