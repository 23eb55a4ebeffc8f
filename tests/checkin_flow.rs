use chrono::{Duration, Local};
use devhabit::core::{db, error::HabitError, pool, rewards, store::Store};
use devhabit::plugins::habit::{self, CompletionOrigin, HabitCategory, HabitFrequency};
use devhabit::plugins::user;
use tempfile::TempDir;

fn test_store(tmp: &TempDir) -> Store {
    let store = Store::new(tmp.path().join("store"));
    db::initialize_store(&store).expect("initialize store");
    store
}

fn make_habit(store: &Store, username: &str) -> habit::Habit {
    user::create_user(store, username, None).expect("create user");
    habit::create_habit(
        store,
        username,
        "Write code daily",
        "",
        HabitCategory::Code,
        HabitFrequency::Daily,
        None,
    )
    .expect("create habit")
}

#[test]
fn manual_checkin_records_log_and_awards_xp() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);
    let habit = make_habit(&store, "alice");

    let outcome = habit::check_in(&store, &habit.id, Some("first!"), Local::now())
        .expect("check in");
    assert!(outcome.created);
    assert_eq!(outcome.xp_earned, rewards::XP_PER_COMPLETION);
    assert_eq!(outcome.current_streak, 1);
    assert_eq!(outcome.total_completions, 1);

    let db_path = db::habit_db_path(&store);
    let (logs, owner) = pool::global_pool()
        .with_read(&db_path, |conn| {
            Ok((
                habit::list_logs(conn, &habit.id)?,
                user::resolve_user(conn, "alice")?,
            ))
        })
        .expect("read back");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].origin, "manual");
    assert_eq!(logs[0].note.as_deref(), Some("first!"));
    assert_eq!(owner.total_xp, 10);
    assert_eq!(owner.level, 1);
    assert_eq!(owner.current_streak, 1);
}

#[test]
fn second_manual_checkin_same_day_conflicts_without_mutation() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);
    let habit = make_habit(&store, "bob");

    habit::check_in(&store, &habit.id, None, Local::now()).expect("first check-in");
    let err = habit::check_in(&store, &habit.id, None, Local::now())
        .expect_err("same-day manual must conflict");
    assert!(matches!(err, HabitError::AlreadyCompletedToday(_)), "{err}");

    let db_path = db::habit_db_path(&store);
    let (logs, owner) = pool::global_pool()
        .with_read(&db_path, |conn| {
            Ok((
                habit::list_logs(conn, &habit.id)?,
                user::resolve_user(conn, "bob")?,
            ))
        })
        .expect("read back");
    assert_eq!(logs.len(), 1, "conflict must not add a log");
    assert_eq!(owner.total_xp, 10, "conflict must not award xp");
}

#[test]
fn consecutive_days_build_streak_and_gap_resets_it() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);
    let habit = make_habit(&store, "carol");
    let db_path = db::habit_db_path(&store);
    let now = Local::now();

    for days_ago in [2i64, 1, 0] {
        pool::global_pool()
            .with_write(&db_path, |conn| {
                habit::record_completion(
                    conn,
                    &habit.id,
                    CompletionOrigin::Manual,
                    None,
                    now - Duration::days(days_ago),
                )
            })
            .expect("record completion");
    }

    let refreshed = pool::global_pool()
        .with_read(&db_path, |conn| habit::get_habit(conn, &habit.id))
        .expect("get habit");
    assert_eq!(refreshed.current_streak, 3);
    assert_eq!(refreshed.longest_streak, 3);
    assert_eq!(refreshed.total_completions, 3);

    // A second habit with a gap: days -4, -3, then today.
    let gapped = habit::create_habit(
        &store,
        "carol",
        "Review PRs",
        "",
        HabitCategory::Code,
        HabitFrequency::Daily,
        None,
    )
    .expect("create habit");
    for days_ago in [4i64, 3, 0] {
        pool::global_pool()
            .with_write(&db_path, |conn| {
                habit::record_completion(
                    conn,
                    &gapped.id,
                    CompletionOrigin::Manual,
                    None,
                    now - Duration::days(days_ago),
                )
            })
            .expect("record completion");
    }
    let refreshed = pool::global_pool()
        .with_read(&db_path, |conn| habit::get_habit(conn, &gapped.id))
        .expect("get habit");
    assert_eq!(refreshed.current_streak, 1, "gap resets the current streak");
    assert_eq!(refreshed.longest_streak, 2, "historical best is kept");
}

#[test]
fn xp_accumulates_into_level_thresholds() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);
    let habit = make_habit(&store, "dave");
    let db_path = db::habit_db_path(&store);
    let now = Local::now();

    // Ten completions on distinct days: 100 xp, level 2.
    for days_ago in (0i64..10).rev() {
        pool::global_pool()
            .with_write(&db_path, |conn| {
                habit::record_completion(
                    conn,
                    &habit.id,
                    CompletionOrigin::Manual,
                    None,
                    now - Duration::days(days_ago),
                )
            })
            .expect("record completion");
    }

    let owner = pool::global_pool()
        .with_read(&db_path, |conn| user::resolve_user(conn, "dave"))
        .expect("resolve user");
    assert_eq!(owner.total_xp, 100);
    assert_eq!(owner.level, 2);
    assert_eq!(owner.current_streak, 10);
    assert_eq!(owner.longest_streak, 10);
}

#[test]
fn archived_habit_rejects_checkins_but_keeps_logs() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);
    let habit = make_habit(&store, "erin");

    habit::check_in(&store, &habit.id, None, Local::now()).expect("check in");
    let archived = habit::archive_habit(&store, &habit.id).expect("archive");
    assert!(!archived.is_active);
    assert!(archived.archived_at.is_some());

    let err = habit::check_in(&store, &habit.id, None, Local::now())
        .expect_err("archived habit must reject check-ins");
    assert!(matches!(err, HabitError::ValidationError(_)), "{err}");

    let db_path = db::habit_db_path(&store);
    let logs = pool::global_pool()
        .with_read(&db_path, |conn| habit::list_logs(conn, &habit.id))
        .expect("list logs");
    assert_eq!(logs.len(), 1, "archive keeps the completion history");

    let restored = habit::restore_habit(&store, &habit.id).expect("restore");
    assert!(restored.is_active);
    assert!(restored.archived_at.is_none());
}

#[test]
fn user_streak_is_max_over_active_habits() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);
    let first = make_habit(&store, "frank");
    let second = habit::create_habit(
        &store,
        "frank",
        "Read papers",
        "",
        HabitCategory::Learn,
        HabitFrequency::Daily,
        None,
    )
    .expect("create habit");
    let db_path = db::habit_db_path(&store);
    let now = Local::now();

    for days_ago in [1i64, 0] {
        pool::global_pool()
            .with_write(&db_path, |conn| {
                habit::record_completion(
                    conn,
                    &first.id,
                    CompletionOrigin::Manual,
                    None,
                    now - Duration::days(days_ago),
                )
            })
            .expect("record completion");
    }
    pool::global_pool()
        .with_write(&db_path, |conn| {
            habit::record_completion(conn, &second.id, CompletionOrigin::Manual, None, now)
        })
        .expect("record completion");

    let owner = pool::global_pool()
        .with_read(&db_path, |conn| user::resolve_user(conn, "frank"))
        .expect("resolve user");
    assert_eq!(owner.current_streak, 2, "user streak is the per-habit max");
    assert_eq!(owner.total_xp, 30);
}

#[test]
fn duplicate_username_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let store = test_store(&tmp);

    user::create_user(&store, "grace", None).expect("create user");
    let err = user::create_user(&store, "grace", None).expect_err("duplicate username");
    assert!(matches!(err, HabitError::ValidationError(_)), "{err}");
}
