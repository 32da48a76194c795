use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::category::Category;
use crate::config::Config;
use crate::datetime::format_local_date;
use crate::task::{Priority, Task};
use crate::view::TaskStats;

const SHOWN_TAGS: usize = 2;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);

        Ok(Self { color, tz })
    }

    #[tracing::instrument(skip(self, out, tasks, now), fields(count = tasks.len()))]
    pub fn print_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Pri".to_string(),
            "Category".to_string(),
            "Title".to_string(),
            "Tags".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due_date
                .map(|date| format_local_date(date, self.tz))
                .unwrap_or_default();
            let due = if task.is_overdue(now) {
                self.paint(&due, "31")
            } else {
                due
            };

            let priority = match task.priority {
                Priority::High => self.paint("H", "31"),
                Priority::Medium => "M".to_string(),
                Priority::Low => "L".to_string(),
            };

            let mut title = task.title.clone();
            if task.completed {
                title = self.paint(&title, "9");
            }
            if !task.subtasks.is_empty() {
                let done = task.subtasks.iter().filter(|s| s.completed).count();
                title.push_str(&format!(" ({done}/{})", task.subtasks.len()));
            }

            rows.push(vec![
                self.paint(task.id.short(), "33"),
                due,
                priority,
                task.category.clone(),
                title,
                tag_summary(&task.tags),
            ]);
        }

        write_table(out, headers, rows)
    }

    pub fn print_stats<W: Write>(&self, out: &mut W, stats: &TaskStats) -> anyhow::Result<()> {
        let overdue = stats.overdue.to_string();
        let overdue = if stats.overdue > 0 {
            self.paint(&overdue, "31")
        } else {
            overdue
        };

        writeln!(
            out,
            "{} tasks, {} completed ({:.0}%), {} overdue, {} due today",
            stats.total, stats.completed, stats.completion_rate, overdue, stats.due_today
        )?;
        Ok(())
    }

    pub fn print_categories<W: Write>(
        &self,
        out: &mut W,
        categories: &[Category],
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        let counts = open_counts_by_category(tasks);
        let headers = vec![
            "Name".to_string(),
            "Color".to_string(),
            "Icon".to_string(),
            "Open".to_string(),
        ];
        let rows = categories
            .iter()
            .map(|category| {
                vec![
                    category.name.clone(),
                    category.color.clone(),
                    category.icon.clone(),
                    counts
                        .get(category.name.as_str())
                        .copied()
                        .unwrap_or(0)
                        .to_string(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn tag_summary(tags: &[String]) -> String {
    let mut shown: Vec<String> = tags.iter().take(SHOWN_TAGS).map(|tag| format!("#{tag}")).collect();
    if tags.len() > SHOWN_TAGS {
        shown.push(format!("+{}", tags.len() - SHOWN_TAGS));
    }
    shown.join(" ")
}

fn open_counts_by_category(tasks: &[Task]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for task in tasks.iter().filter(|task| !task.completed) {
        *counts.entry(task.category.as_str()).or_insert(0_usize) += 1;
    }
    counts
}

/// Left-aligned columns sized to the widest visible cell, one trailing space
/// per cell. ANSI colour codes do not count towards the width.
fn write_table<W: Write>(
    out: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| visible_width(h)).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    for line in std::iter::once(&headers).chain(std::iter::once(&rule)).chain(&rows) {
        for (cell, width) in line.iter().zip(&widths) {
            let pad = width.saturating_sub(visible_width(cell));
            write!(out, "{cell}{:pad$} ", "")?;
        }
        writeln!(out)?;
    }

    Ok(())
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

/// Drops `ESC [ ... m` sequences.
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('\x1b') {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find('m') {
            Some(end) => &rest[start + end + 1..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}
