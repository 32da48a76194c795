use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::category::{Category, default_categories};
use crate::storage::KeyValueStore;
use crate::task::{Task, TaskDraft, TaskId, TaskPatch};

pub const DEFAULT_STORAGE_KEY: &str = "ticklist-tasks";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns the task collection and mirrors it into one storage slot. Every
/// mutation rewrites the whole slot.
///
/// Mutations addressed to an id that is not in the collection do nothing and
/// report that through their return value; they are never errors.
pub struct TaskStore<S> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    clock: Clock,
    save_error: Option<anyhow::Error>,
}

impl<S: KeyValueStore> TaskStore<S> {
    pub fn load(storage: S) -> Self {
        Self::load_with_key(storage, DEFAULT_STORAGE_KEY)
    }

    /// Restores the collection from `key`. A missing, unreadable or garbled
    /// slot yields an empty store.
    #[tracing::instrument(skip(storage))]
    pub fn load_with_key(storage: S, key: &str) -> Self {
        let tasks = match storage.get_item(key) {
            Ok(Some(raw)) => decode_tasks(&raw),
            Ok(None) => {
                debug!(key, "no persisted tasks");
                Vec::new()
            }
            Err(err) => {
                warn!(key, error = %format!("{err:#}"), "failed reading persisted tasks; starting empty");
                Vec::new()
            }
        };

        info!(key, count = tasks.len(), "loaded tasks");
        Self {
            storage,
            key: key.to_string(),
            tasks,
            categories: default_categories(),
            clock: Arc::new(Utc::now),
            save_error: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    #[tracing::instrument(skip(self), fields(key = %self.key, count = self.tasks.len()))]
    pub fn save(&mut self) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&self.tasks).context("failed to serialize tasks")?;
        self.storage
            .set_item(&self.key, &payload)
            .with_context(|| format!("failed to write storage slot {}", self.key))
    }

    /// The most recent write failure from a mutation, if any. Taking it
    /// clears it.
    pub fn take_save_error(&mut self) -> Option<anyhow::Error> {
        self.save_error.take()
    }

    fn persist(&mut self) {
        match self.save() {
            Ok(()) => self.save_error = None,
            Err(err) => {
                error!(key = %self.key, error = %format!("{err:#}"), "failed to persist tasks");
                self.save_error = Some(err);
            }
        }
    }

    #[tracing::instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    pub fn add_task(&mut self, draft: TaskDraft) -> Task {
        let now = self.now();
        let mut id = TaskId::generate();
        while self.get(&id).is_some() {
            id = TaskId::generate();
        }

        let task = Task::from_draft(draft, id, now);
        debug!(id = %task.id, "adding task");
        self.tasks.push(task.clone());
        self.persist();
        task
    }

    /// Returns `false` when no task has `id`.
    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> bool {
        let now = self.now();
        let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) else {
            debug!("update ignored; unknown task id");
            return false;
        };

        task.apply_patch(patch, now);
        self.persist();
        true
    }

    /// Returns `false` when no task has `id`.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete_task(&mut self, id: &TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| &task.id != id);
        if self.tasks.len() == before {
            debug!("delete ignored; unknown task id");
            return false;
        }

        self.persist();
        true
    }

    /// Flips `completed` and returns the new value, or `None` for an unknown id.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_task(&mut self, id: &TaskId) -> Option<bool> {
        let Some(current) = self.get(id).map(|task| task.completed) else {
            debug!("toggle ignored; unknown task id");
            return None;
        };

        self.update_task(id, TaskPatch::completed(!current));
        Some(!current)
    }
}

/// Decodes a persisted slot. Entries that do not parse, have an empty id or
/// repeat an earlier id are dropped; the rest load.
fn decode_tasks(raw: &str) -> Vec<Task> {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!("persisted tasks are not a list; starting empty");
            return Vec::new();
        }
        Err(err) => {
            warn!(error = %err, "persisted tasks are not valid JSON; starting empty");
            return Vec::new();
        }
    };

    let mut seen = HashSet::with_capacity(entries.len());
    let mut tasks = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let mut task: Task = match serde_json::from_value(entry) {
            Ok(task) => task,
            Err(err) => {
                warn!(index = idx, error = %err, "dropping malformed task entry");
                continue;
            }
        };

        if task.id.as_str().is_empty() {
            warn!(index = idx, "dropping task entry with empty id");
            continue;
        }
        if !seen.insert(task.id.clone()) {
            warn!(index = idx, id = %task.id, "dropping task entry with duplicate id");
            continue;
        }
        if task.updated_at < task.created_at {
            debug!(id = %task.id, "clamping updatedAt to createdAt");
            task.updated_at = task.created_at;
        }

        tasks.push(task);
    }

    tasks
}
