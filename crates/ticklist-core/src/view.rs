use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Days,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::collate::locale_cmp;
use crate::datetime::{
  local_date,
  start_of_day
};
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
  #[default]
  Today,
  Week,
  All,
  Completed
}

impl ViewMode {
  pub fn as_str(self) -> &'static str {
    match self {
      | ViewMode::Today => "today",
      | ViewMode::Week => "week",
      | ViewMode::All => "all",
      | ViewMode::Completed => {
        "completed"
      }
    }
  }
}

impl FromStr for ViewMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "today" => Ok(ViewMode::Today),
      | "week" => Ok(ViewMode::Week),
      | "all" => Ok(ViewMode::All),
      | "completed" | "done" => {
        Ok(ViewMode::Completed)
      }
      | other => Err(anyhow!(
        "unknown view mode: {other} \
         (expected today, week, all \
         or completed)"
      ))
    }
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SortMode {
  #[default]
  DueDate,
  Priority,
  Created,
  Alphabetical
}

impl SortMode {
  pub fn as_str(self) -> &'static str {
    match self {
      | SortMode::DueDate => "dueDate",
      | SortMode::Priority => {
        "priority"
      }
      | SortMode::Created => "created",
      | SortMode::Alphabetical => {
        "alphabetical"
      }
    }
  }
}

impl FromStr for SortMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "duedate" | "due_date"
      | "due-date" | "due" => {
        Ok(SortMode::DueDate)
      }
      | "priority" | "pri" => {
        Ok(SortMode::Priority)
      }
      | "created" | "newest" => {
        Ok(SortMode::Created)
      }
      | "alphabetical" | "alpha"
      | "title" => {
        Ok(SortMode::Alphabetical)
      }
      | other => Err(anyhow!(
        "unknown sort mode: {other} \
         (expected dueDate, priority, \
         created or alphabetical)"
      ))
    }
  }
}

impl fmt::Display for SortMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The transient selections that shape the visible list. An empty
/// `category` or `search` disables that stage.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ViewQuery {
  pub mode:     ViewMode,
  pub category: String,
  pub search:   String,
  pub sort:     SortMode
}

#[derive(
  Debug, Clone, Copy, PartialEq, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
  pub total:           usize,
  pub completed:       usize,
  pub overdue:         usize,
  pub due_today:       usize,
  pub completion_rate: f64
}

/// Day boundaries for one evaluation, all in the configured zone.
#[derive(Debug, Clone, Copy)]
struct DayWindow {
  today:       NaiveDate,
  today_start: DateTime<Utc>,
  week_end:    DateTime<Utc>
}

impl DayWindow {
  fn new(
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let today = local_date(now, tz);
    let today_start =
      start_of_day(today, tz);
    let week_end = today
      .checked_add_days(Days::new(7))
      .map(|day| start_of_day(day, tz))
      .unwrap_or(DateTime::<Utc>::MAX_UTC);

    Self {
      today,
      today_start,
      week_end
    }
  }
}

/// Filters then sorts `tasks` for display. Borrowed rows keep the records
/// untouched.
#[tracing::instrument(skip(tasks, now, tz), fields(count = tasks.len()))]
pub fn visible_tasks<'a>(
  tasks: &'a [Task],
  query: &ViewQuery,
  now: DateTime<Utc>,
  tz: Tz
) -> Vec<&'a Task> {
  let mut rows =
    filter_tasks(tasks, query, now, tz);
  sort_tasks(&mut rows, query.sort);
  rows
}

/// View mode, then category, then search. Input order is preserved.
pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  query: &ViewQuery,
  now: DateTime<Utc>,
  tz: Tz
) -> Vec<&'a Task> {
  let window = DayWindow::new(now, tz);
  let needle =
    query.search.to_lowercase();

  tasks
    .iter()
    .filter(|task| {
      matches_view(
        task, query.mode, &window, tz
      )
    })
    .filter(|task| {
      query.category.is_empty()
        || task.category
          == query.category
    })
    .filter(|task| {
      needle.is_empty()
        || matches_search(task, &needle)
    })
    .collect()
}

/// Stable sort; rows with equal keys keep their filtered order.
pub fn sort_tasks(
  rows: &mut [&Task],
  sort: SortMode
) {
  rows.sort_by(|a, b| {
    compare_tasks(a, b, sort)
  });
}

pub fn compare_tasks(
  a: &Task,
  b: &Task,
  sort: SortMode
) -> Ordering {
  match sort {
    | SortMode::DueDate => {
      match (a.due_date, b.due_date) {
        | (Some(a_due), Some(b_due)) => {
          a_due.cmp(&b_due)
        }
        | (Some(_), None) => {
          Ordering::Less
        }
        | (None, Some(_)) => {
          Ordering::Greater
        }
        | (None, None) => {
          Ordering::Equal
        }
      }
    }
    | SortMode::Priority => {
      b.priority
        .rank()
        .cmp(&a.priority.rank())
    }
    | SortMode::Created => {
      b.created_at.cmp(&a.created_at)
    }
    | SortMode::Alphabetical => {
      locale_cmp(&a.title, &b.title)
    }
  }
}

fn matches_view(
  task: &Task,
  mode: ViewMode,
  window: &DayWindow,
  tz: Tz
) -> bool {
  let ok = match mode {
    // every open task due today or earlier, overdue included
    | ViewMode::Today => {
      !task.completed
        && task
          .due_date
          .map(|due| {
            local_date(due, tz)
              <= window.today
          })
          .unwrap_or(false)
    }
    | ViewMode::Week => {
      !task.completed
        && task
          .due_date
          .map(|due| {
            due >= window.today_start
              && due <= window.week_end
          })
          .unwrap_or(false)
    }
    | ViewMode::Completed => {
      task.completed
    }
    | ViewMode::All => !task.completed
  };

  trace!(id = %task.id, mode = %mode, ok, "view mode evaluation");
  ok
}

fn matches_search(
  task: &Task,
  needle: &str
) -> bool {
  task
    .title
    .to_lowercase()
    .contains(needle)
    || task
      .description
      .as_deref()
      .map(|text| {
        text
          .to_lowercase()
          .contains(needle)
      })
      .unwrap_or(false)
    || task.tags.iter().any(|tag| {
      tag.to_lowercase().contains(needle)
    })
}

/// Aggregates over the whole collection, ignoring any view selection.
pub fn task_stats(
  tasks: &[Task],
  now: DateTime<Utc>,
  tz: Tz
) -> TaskStats {
  let today = local_date(now, tz);

  let total = tasks.len();
  let completed = tasks
    .iter()
    .filter(|task| task.completed)
    .count();
  let overdue = tasks
    .iter()
    .filter(|task| task.is_overdue(now))
    .count();
  let due_today = tasks
    .iter()
    .filter(|task| {
      !task.completed
        && task
          .due_date
          .map(|due| {
            local_date(due, tz) == today
          })
          .unwrap_or(false)
    })
    .count();

  let completion_rate = if total == 0 {
    0.0
  } else {
    completed as f64 / total as f64
      * 100.0
  };

  TaskStats {
    total,
    completed,
    overdue,
    due_today,
    completion_rate
  }
}
