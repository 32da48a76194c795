use std::sync::Arc;

use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::debug;

use crate::category::Category;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft, TaskId, TaskPatch};
use crate::view::{self, SortMode, TaskStats, ViewMode, ViewQuery};

/// What a front end talks to: the store plus the current view selections.
/// Reads are derived from the store on every call.
pub struct TaskSession<S> {
    store: TaskStore<S>,
    query: ViewQuery,
    tz: Tz,
}

impl<S: KeyValueStore> TaskSession<S> {
    pub fn new(store: TaskStore<S>, tz: Tz) -> Self {
        Self {
            store,
            query: ViewQuery::default(),
            tz,
        }
    }

    pub fn with_query(mut self, query: ViewQuery) -> Self {
        self.query = query;
        self
    }

    pub fn store(&self) -> &TaskStore<S> {
        &self.store
    }

    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn tasks(&self) -> Vec<&Task> {
        view::visible_tasks(self.store.tasks(), &self.query, self.store.now(), self.tz)
    }

    pub fn all_tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn categories(&self) -> &[Category] {
        self.store.categories()
    }

    pub fn stats(&self) -> TaskStats {
        view::task_stats(self.store.tasks(), self.store.now(), self.tz)
    }

    pub fn add_task(&mut self, draft: TaskDraft) -> Task {
        self.store.add_task(draft)
    }

    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> bool {
        self.store.update_task(id, patch)
    }

    pub fn delete_task(&mut self, id: &TaskId) -> bool {
        self.store.delete_task(id)
    }

    pub fn toggle_task(&mut self, id: &TaskId) -> Option<bool> {
        self.store.toggle_task(id)
    }

    pub fn take_save_error(&mut self) -> Option<anyhow::Error> {
        self.store.take_save_error()
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        debug!(%mode, "view mode selected");
        self.query.mode = mode;
    }

    pub fn set_sort_mode(&mut self, sort: SortMode) {
        debug!(%sort, "sort mode selected");
        self.query.sort = sort;
    }

    pub fn set_search_query(&mut self, search: impl Into<String>) {
        self.query.search = search.into();
    }

    pub fn set_selected_category(&mut self, category: impl Into<String>) {
        self.query.category = category.into();
    }
}

/// A session behind one lock, for embedders that touch it from several
/// threads. Every read and mutation holds the lock for its whole duration.
pub struct SharedSession<S> {
    inner: Arc<Mutex<TaskSession<S>>>,
}

impl<S> Clone for SharedSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KeyValueStore> SharedSession<S> {
    pub fn new(session: TaskSession<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut TaskSession<S>) -> R) -> R {
        let mut session = self.inner.lock();
        f(&mut session)
    }

    /// Owned snapshot of the visible list.
    pub fn tasks(&self) -> Vec<Task> {
        self.with(|session| session.tasks().into_iter().cloned().collect())
    }

    pub fn stats(&self) -> TaskStats {
        self.with(|session| session.stats())
    }

    pub fn add_task(&self, draft: TaskDraft) -> Task {
        self.with(|session| session.add_task(draft))
    }

    pub fn update_task(&self, id: &TaskId, patch: TaskPatch) -> bool {
        self.with(|session| session.update_task(id, patch))
    }

    pub fn delete_task(&self, id: &TaskId) -> bool {
        self.with(|session| session.delete_task(id))
    }

    pub fn toggle_task(&self, id: &TaskId) -> Option<bool> {
        self.with(|session| session.toggle_task(id))
    }
}
