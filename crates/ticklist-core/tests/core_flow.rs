use std::ffi::OsString;
use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::tempdir;
use ticklist_core::session::TaskSession;
use ticklist_core::storage::{FileStore, KeyValueStore};
use ticklist_core::store::{DEFAULT_STORAGE_KEY, TaskStore};
use ticklist_core::task::{Priority, Subtask, TaskDraft, TaskPatch};
use ticklist_core::view::{SortMode, ViewMode};

fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap()
}

fn titles(session: &TaskSession<FileStore>) -> Vec<String> {
    session.tasks().iter().map(|t| t.title.clone()).collect()
}

#[test]
fn file_store_roundtrip_keeps_every_field() {
    let temp = tempdir().expect("tempdir");
    let now = monday_morning();

    let saved = {
        let storage = FileStore::open(temp.path()).expect("open store");
        let mut store = TaskStore::load(storage).with_clock(Arc::new(move || now));

        let mut draft = TaskDraft::new("Plan sprint");
        draft.description = Some("pick the top five".to_string());
        draft.priority = Priority::High;
        draft.category = "Work".to_string();
        draft.due_date = Some(now + Duration::milliseconds(90_123));
        draft.tags = vec!["planning".to_string(), "team".to_string()];
        draft.subtasks = vec![Subtask::new("collect tickets")];
        let task = store.add_task(draft);
        store.add_task(TaskDraft::new("Inbox zero"));
        store.update_task(&task.id, TaskPatch::completed(true));

        store.tasks().to_vec()
    };

    let raw = FileStore::open(temp.path())
        .expect("reopen store")
        .get_item(DEFAULT_STORAGE_KEY)
        .expect("read slot")
        .expect("slot written");
    assert!(raw.contains("\"dueDate\":\"2026-02-16T09:01:30.123Z\""));

    let reloaded = TaskStore::load(FileStore::open(temp.path()).expect("reopen store"));
    assert_eq!(reloaded.tasks(), saved.as_slice());
}

#[test]
fn today_and_week_views_and_overdue_count() {
    let temp = tempdir().expect("tempdir");
    let now = monday_morning();
    let storage = FileStore::open(temp.path()).expect("open store");
    let store = TaskStore::load(storage).with_clock(Arc::new(move || now));
    let mut session = TaskSession::new(store, chrono_tz::UTC);

    let due = [
        ("yesterday", now - Duration::days(1)),
        ("today", Utc.with_ymd_and_hms(2026, 2, 16, 17, 0, 0).unwrap()),
        ("tomorrow", now + Duration::days(1)),
        ("next week", now + Duration::days(6)),
    ];
    for (title, at) in due {
        let mut draft = TaskDraft::new(title);
        draft.due_date = Some(at);
        session.add_task(draft);
    }
    session.add_task(TaskDraft::new("no date"));

    session.set_view_mode(ViewMode::Today);
    assert_eq!(titles(&session), vec!["yesterday", "today"]);

    session.set_view_mode(ViewMode::Week);
    assert_eq!(titles(&session), vec!["today", "tomorrow", "next week"]);

    session.set_view_mode(ViewMode::All);
    session.set_sort_mode(SortMode::Alphabetical);
    assert_eq!(
        titles(&session),
        vec!["next week", "no date", "today", "tomorrow", "yesterday"]
    );

    let stats = session.stats();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.overdue, 1);
    assert_eq!(stats.due_today, 1);
    assert_eq!(stats.completed, 0);
}

#[test]
fn today_follows_the_configured_zone() {
    // 23:30 UTC on the 16th is already the 17th in Tokyo.
    let now = Utc.with_ymd_and_hms(2026, 2, 16, 23, 30, 0).unwrap();
    let temp = tempdir().expect("tempdir");
    let storage = FileStore::open(temp.path()).expect("open store");
    let store = TaskStore::load(storage).with_clock(Arc::new(move || now));
    let mut session = TaskSession::new(store, chrono_tz::Asia::Tokyo);

    let mut draft = TaskDraft::new("Tokyo morning");
    draft.due_date = Some(Utc.with_ymd_and_hms(2026, 2, 17, 2, 0, 0).unwrap());
    session.add_task(draft);

    assert_eq!(titles(&session), vec!["Tokyo morning"]);
    assert_eq!(session.stats().due_today, 1);
}

#[test]
fn cli_run_adds_and_persists() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("ticklistrc");
    fs::write(&rc, "storage.key = cli-tasks\ncolor = off\n").expect("write rc");
    let data = temp.path().join("data");

    let args: Vec<OsString> = [
        "ticklist",
        "--config",
        rc.to_str().expect("utf-8 path"),
        "--data",
        data.to_str().expect("utf-8 path"),
        "add",
        "Call the bank",
        "--priority",
        "high",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    ticklist_core::run(args).expect("run add");

    let raw = fs::read_to_string(data.join("cli-tasks.json")).expect("slot file");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value[0]["title"], "Call the bank");
    assert_eq!(value[0]["priority"], "high");
}

#[test]
fn cli_run_fails_when_the_slot_cannot_be_written() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("ticklistrc");
    fs::write(&rc, "storage.key = my tasks\n").expect("write rc");
    let data = temp.path().join("data");

    let args: Vec<OsString> = [
        "ticklist",
        "--config",
        rc.to_str().expect("utf-8 path"),
        "--data",
        data.to_str().expect("utf-8 path"),
        "add",
        "Call the bank",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    let err = ticklist_core::run(args).expect_err("unsaved add must fail");
    assert!(format!("{err:#}").contains("invalid storage key"));

    let written = fs::read_dir(&data).expect("data dir").count();
    assert_eq!(written, 0);
}
