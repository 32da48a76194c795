use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::Priority;
use crate::view::{SortMode, ViewMode};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ticklist",
    version,
    about = "Ticklist: a personal task list with views, filters and stats",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the tasks selected by a view, category and search
    List(ListArgs),
    /// Create a task
    Add(AddArgs),
    /// Change fields of an existing task
    Edit(EditArgs),
    /// Flip a task between open and completed
    Toggle { id: String },
    /// Remove a task
    Delete { id: String },
    /// Totals over every task, regardless of view
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// List the categories and their open task counts
    Categories,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ViewMode>()))]
    pub view: Option<ViewMode>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub search: Option<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SortMode>()))]
    pub sort: Option<SortMode>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub title: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub category: Option<String>,

    /// today, tomorrow, friday, +3d, 2026-03-01, ...
    #[arg(long)]
    pub due: Option<String>,

    #[arg(long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    #[arg(long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Full id or a unique prefix of it
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_description: bool,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub clear_due: bool,

    /// Replaces the tag list
    #[arg(long = "tag", action = ArgAction::Append, conflicts_with = "clear_tags")]
    pub tags: Vec<String>,

    #[arg(long)]
    pub clear_tags: bool,

    #[arg(long, conflicts_with = "reopen")]
    pub complete: bool,

    #[arg(long)]
    pub reopen: bool,
}

/// Installs the stderr subscriber. `RUST_LOG` wins; otherwise `-q`/`-v`
/// move the level from the `warn` default.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| anyhow!("bad log filter {level:?}: {e}"))?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if let Err(err) = installed {
        debug!(error = %err, "global subscriber already installed");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let text = arg.to_string_lossy();
        let captured = text
            .strip_prefix("rc.")
            .and_then(|rest| rest.split_once('=').or_else(|| rest.split_once(':')))
            .map(|(key, value)| (format!("rc.{key}"), value.to_string()));

        match captured {
            Some((key, value)) => {
                debug!(key = %key, value = %value, "captured positional rc override");
                overrides.push((key, value));
            }
            None => cleaned.push(arg.clone()),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, preprocess_args};
    use crate::task::Priority;
    use crate::view::{SortMode, ViewMode};

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["ticklist", "rc.color=off", "list", "rc.default.sort:priority"]))
            .unwrap();
        assert_eq!(pre.cleaned_args, args(&["ticklist", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.default.sort".to_string(), "priority".to_string()),
            ]
        );
    }

    #[test]
    fn list_flags_parse_into_modes() {
        let cli = GlobalCli::parse_from(args(&["ticklist", "list", "--view", "week", "--sort", "alphabetical", "-v"]));
        assert_eq!(cli.verbose, 1);
        let Some(Command::List(list)) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(list.view, Some(ViewMode::Week));
        assert_eq!(list.sort, Some(SortMode::Alphabetical));
    }

    #[test]
    fn add_collects_repeated_tags() {
        let cli = GlobalCli::parse_from(args(&[
            "ticklist", "add", "Buy milk", "--priority", "high", "--tag", "errand", "--tag", "dairy",
        ]));
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(add.title, "Buy milk");
        assert_eq!(add.priority, Some(Priority::High));
        assert_eq!(add.tags, vec!["errand".to_string(), "dairy".to_string()]);
    }

    #[test]
    fn edit_rejects_conflicting_flags() {
        let result = GlobalCli::try_parse_from(args(&["ticklist", "edit", "abc", "--due", "today", "--clear-due"]));
        assert!(result.is_err());
    }
}
