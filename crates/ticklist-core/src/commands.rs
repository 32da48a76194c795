use std::io::Write;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgs, Command, EditArgs, ListArgs};
use crate::datetime::parse_date_expr;
use crate::render::Renderer;
use crate::session::TaskSession;
use crate::storage::KeyValueStore;
use crate::task::{Subtask, Task, TaskDraft, TaskId, TaskPatch};

#[instrument(skip(session, renderer, out))]
pub fn dispatch<S: KeyValueStore, W: Write>(
    session: &mut TaskSession<S>,
    renderer: &Renderer,
    command: Option<Command>,
    out: &mut W,
) -> anyhow::Result<()> {
    match command.unwrap_or_else(|| Command::List(ListArgs::default())) {
        Command::List(args) => cmd_list(session, renderer, args, out),
        Command::Add(args) => cmd_add(session, args, out),
        Command::Edit(args) => cmd_edit(session, args, out),
        Command::Toggle { id } => cmd_toggle(session, &id, out),
        Command::Delete { id } => cmd_delete(session, &id, out),
        Command::Stats { json } => cmd_stats(session, renderer, json, out),
        Command::Categories => {
            renderer.print_categories(out, session.categories(), session.all_tasks())
        }
    }
}

/// Maps a user-typed id to a stored one: an exact match wins, otherwise a
/// prefix shared by exactly one task. A token nothing starts with is passed
/// through unchanged.
pub fn resolve_task_id(tasks: &[Task], token: &str) -> anyhow::Result<TaskId> {
    let token = token.trim();
    if token.is_empty() {
        return Err(anyhow!("task id cannot be empty"));
    }

    if let Some(task) = tasks.iter().find(|task| task.id.as_str() == token) {
        return Ok(task.id.clone());
    }

    let mut matches = tasks.iter().filter(|task| task.id.as_str().starts_with(token));
    let Some(first) = matches.next() else {
        debug!(token, "id token matched nothing");
        return Ok(TaskId::from(token));
    };
    if matches.next().is_some() {
        return Err(anyhow!("ambiguous task id prefix: {token}"));
    }

    Ok(first.id.clone())
}

fn cmd_list<S: KeyValueStore, W: Write>(
    session: &mut TaskSession<S>,
    renderer: &Renderer,
    args: ListArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    if let Some(mode) = args.view {
        session.set_view_mode(mode);
    }
    if let Some(sort) = args.sort {
        session.set_sort_mode(sort);
    }
    if let Some(category) = args.category {
        let name = canonical_category(session, &category);
        session.set_selected_category(name);
    }
    if let Some(search) = args.search {
        session.set_search_query(search);
    }

    let rows = session.tasks();
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &rows).context("failed to encode tasks")?;
        writeln!(out)?;
        return Ok(());
    }

    renderer.print_task_table(out, &rows, session.store().now())
}

fn cmd_add<S: KeyValueStore, W: Write>(
    session: &mut TaskSession<S>,
    args: AddArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let title = args.title.trim();
    if title.is_empty() {
        return Err(anyhow!("task title cannot be empty"));
    }

    let mut draft = TaskDraft::new(title);
    draft.description = args.description.filter(|text| !text.trim().is_empty());
    draft.priority = args.priority.unwrap_or_default();
    if let Some(category) = args.category {
        draft.category = canonical_category(session, &category);
    }
    if let Some(raw) = args.due {
        let now = session.store().now();
        draft.due_date = Some(
            parse_date_expr(&raw, now, session.timezone())
                .with_context(|| format!("invalid due date: {raw}"))?,
        );
    }
    draft.tags = clean_tags(args.tags);
    draft.subtasks = args
        .subtasks
        .iter()
        .map(|title| title.trim())
        .filter(|title| !title.is_empty())
        .map(Subtask::new)
        .collect();

    let task = session.add_task(draft);
    ensure_saved(session)?;
    writeln!(out, "Created task {}.", task.id.short())?;
    Ok(())
}

fn cmd_edit<S: KeyValueStore, W: Write>(
    session: &mut TaskSession<S>,
    args: EditArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command edit");

    let id = resolve_task_id(session.all_tasks(), &args.id)?;
    let mut patch = TaskPatch::default();

    if let Some(title) = args.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(anyhow!("task title cannot be empty"));
        }
        patch.title = Some(title.to_string());
    }

    if args.clear_description {
        patch.description = Some(None);
    } else if let Some(description) = args.description {
        patch.description = Some(Some(description).filter(|text| !text.trim().is_empty()));
    }

    patch.priority = args.priority;

    if let Some(category) = args.category {
        patch.category = Some(canonical_category(session, &category));
    }

    if args.clear_due {
        patch.due_date = Some(None);
    } else if let Some(raw) = args.due {
        let now = session.store().now();
        let due = parse_date_expr(&raw, now, session.timezone())
            .with_context(|| format!("invalid due date: {raw}"))?;
        patch.due_date = Some(Some(due));
    }

    if args.clear_tags {
        patch.tags = Some(Vec::new());
    } else if !args.tags.is_empty() {
        patch.tags = Some(clean_tags(args.tags));
    }

    if args.complete {
        patch.completed = Some(true);
    } else if args.reopen {
        patch.completed = Some(false);
    }

    if patch.is_empty() {
        return Err(anyhow!("nothing to change; pass at least one field to edit"));
    }

    let updated = session.update_task(&id, patch);
    ensure_saved(session)?;
    if updated {
        writeln!(out, "Modified task {}.", id.short())?;
    } else {
        writeln!(out, "No task matched {}.", args.id)?;
    }
    Ok(())
}

fn cmd_toggle<S: KeyValueStore, W: Write>(
    session: &mut TaskSession<S>,
    token: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command toggle");

    let id = resolve_task_id(session.all_tasks(), token)?;
    let toggled = session.toggle_task(&id);
    ensure_saved(session)?;
    match toggled {
        Some(true) => writeln!(out, "Completed task {}.", id.short())?,
        Some(false) => writeln!(out, "Reopened task {}.", id.short())?,
        None => writeln!(out, "No task matched {token}.")?,
    }
    Ok(())
}

fn cmd_delete<S: KeyValueStore, W: Write>(
    session: &mut TaskSession<S>,
    token: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");

    let id = resolve_task_id(session.all_tasks(), token)?;
    let deleted = session.delete_task(&id);
    ensure_saved(session)?;
    if deleted {
        writeln!(out, "Deleted task {}.", id.short())?;
    } else {
        writeln!(out, "No task matched {token}.")?;
    }
    Ok(())
}

fn cmd_stats<S: KeyValueStore, W: Write>(
    session: &TaskSession<S>,
    renderer: &Renderer,
    json: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command stats");

    let stats = session.stats();
    if json {
        serde_json::to_writer_pretty(&mut *out, &stats).context("failed to encode stats")?;
        writeln!(out)?;
        return Ok(());
    }

    renderer.print_stats(out, &stats)
}

/// A mutation that could not be written has not happened as far as the
/// next invocation is concerned.
fn ensure_saved<S: KeyValueStore>(session: &mut TaskSession<S>) -> anyhow::Result<()> {
    match session.take_save_error() {
        Some(err) => Err(err.context("tasks were not saved")),
        None => Ok(()),
    }
}

/// Resolves a typed category. A name some task already carries verbatim is
/// kept; otherwise it is matched against the known names ignoring ASCII
/// case, and unknown names are kept as typed.
fn canonical_category<S: KeyValueStore>(session: &TaskSession<S>, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let exact = session.categories().iter().any(|category| category.name == raw)
        || session.all_tasks().iter().any(|task| task.category == raw);
    if exact {
        return raw.to_string();
    }

    match session
        .categories()
        .iter()
        .find(|category| category.name.eq_ignore_ascii_case(raw))
    {
        Some(category) => category.name.clone(),
        None => {
            warn!(category = raw, "category is not one of the known categories");
            raw.to_string()
        }
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_string();
        if !tag.is_empty() && !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}
