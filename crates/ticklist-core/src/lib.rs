pub mod category;
pub mod cli;
pub mod collate;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod render;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting ticklist"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open task storage \
           at {}",
          data_dir.display()
        )
      })?;
  let store =
    store::TaskStore::load_with_key(
      storage,
      &cfg.storage_key()
    );

  let tz = datetime::resolve_timezone(
    cfg.timezone().as_deref()
  );
  let query = view::ViewQuery {
    mode: cfg.default_view()?,
    sort: cfg.default_sort()?,
    ..view::ViewQuery::default()
  };
  let mut session =
    session::TaskSession::new(store, tz)
      .with_query(query);

  let renderer =
    render::Renderer::new(&cfg, tz)?;

  let stdout = io::stdout();
  let mut out = stdout.lock();
  commands::dispatch(
    &mut session,
    &renderer,
    cli.command,
    &mut out
  )?;

  info!("done");
  Ok(())
}
