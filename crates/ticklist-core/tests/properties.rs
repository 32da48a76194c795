//! Property tests over the store and the view engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use ticklist_core::storage::MemoryStore;
use ticklist_core::store::TaskStore;
use ticklist_core::task::{Priority, Subtask, Task, TaskDraft, TaskId};
use ticklist_core::view::{self, ViewMode, ViewQuery};

// 1970 .. roughly 2096, in milliseconds.
const MAX_MILLIS: i64 = 4_000_000_000_000;

fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0..MAX_MILLIS).prop_map(|ms| DateTime::from_timestamp_millis(ms).unwrap_or_default())
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
    ]
}

fn arb_zone() -> impl Strategy<Value = chrono_tz::Tz> {
    prop_oneof![
        Just(chrono_tz::UTC),
        Just(chrono_tz::America::New_York),
        Just(chrono_tz::Asia::Kolkata),
        Just(chrono_tz::Pacific::Auckland),
    ]
}

fn arb_draft() -> impl Strategy<Value = TaskDraft> {
    (
        "[A-Za-z0-9 ]{1,24}",
        proptest::option::of("[a-z ]{0,40}"),
        any::<bool>(),
        arb_priority(),
        prop_oneof![Just(String::new()), Just("Work".to_string()), Just("Health".to_string())],
        proptest::option::of(arb_instant()),
        prop::collection::vec("[a-z]{1,8}", 0..4),
        prop::collection::vec(("[a-z ]{1,12}", any::<bool>()), 0..3),
    )
        .prop_map(
            |(title, description, completed, priority, category, due_date, tags, subtasks)| TaskDraft {
                title,
                description,
                completed,
                priority,
                category,
                due_date,
                tags,
                subtasks: subtasks
                    .into_iter()
                    .map(|(title, completed)| Subtask {
                        completed,
                        ..Subtask::new(title)
                    })
                    .collect(),
            },
        )
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    (prop::collection::vec(arb_draft(), 0..24), arb_instant()).prop_map(|(drafts, created)| {
        drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| Task::from_draft(draft, TaskId::from(format!("t{idx}")), created))
            .collect()
    })
}

proptest! {
    #[test]
    fn undated_tasks_never_show_in_day_views(
        tasks in arb_tasks(),
        now in arb_instant(),
        tz in arb_zone(),
    ) {
        for mode in [ViewMode::Today, ViewMode::Week] {
            let query = ViewQuery { mode, ..ViewQuery::default() };
            for task in view::visible_tasks(&tasks, &query, now, tz) {
                prop_assert!(task.due_date.is_some());
                prop_assert!(!task.completed);
            }
        }
    }

    #[test]
    fn completion_rate_matches_counts(tasks in arb_tasks(), now in arb_instant()) {
        let stats = view::task_stats(&tasks, now, chrono_tz::UTC);
        let completed = tasks.iter().filter(|t| t.completed).count();

        prop_assert_eq!(stats.total, tasks.len());
        prop_assert_eq!(stats.completed, completed);
        if tasks.is_empty() {
            prop_assert_eq!(stats.completion_rate, 0.0);
        } else {
            let expected = 100.0 * completed as f64 / tasks.len() as f64;
            prop_assert!((stats.completion_rate - expected).abs() < 1e-9);
        }
        prop_assert!(stats.overdue <= stats.total - stats.completed);
    }

    #[test]
    fn visible_rows_are_a_subset_in_sort_order(tasks in arb_tasks(), now in arb_instant()) {
        let query = ViewQuery { mode: ViewMode::All, ..ViewQuery::default() };
        let rows = view::visible_tasks(&tasks, &query, now, chrono_tz::UTC);

        prop_assert_eq!(rows.len(), tasks.iter().filter(|t| !t.completed).count());
        for pair in rows.windows(2) {
            prop_assert_ne!(
                view::compare_tasks(pair[0], pair[1], query.sort),
                std::cmp::Ordering::Greater
            );
        }
    }

    #[test]
    fn toggling_twice_restores_completion(draft in arb_draft(), start in arb_instant()) {
        let mut store = TaskStore::load(MemoryStore::new()).with_clock(Arc::new(move || start));
        let task = store.add_task(draft);

        prop_assert_eq!(store.toggle_task(&task.id), Some(!task.completed));
        prop_assert_eq!(store.toggle_task(&task.id), Some(task.completed));

        let after = store.get(&task.id).cloned();
        prop_assert_eq!(after.map(|t| t.completed), Some(task.completed));
    }

    #[test]
    fn saved_collections_load_back_equal(drafts in prop::collection::vec(arb_draft(), 0..16), start in arb_instant()) {
        let mut store = TaskStore::load(MemoryStore::new()).with_clock(Arc::new(move || start));
        for draft in drafts {
            store.add_task(draft);
        }
        prop_assert!(store.save().is_ok());

        let reloaded = TaskStore::load(store.storage().clone());
        prop_assert_eq!(reloaded.tasks(), store.tasks());
    }
}
