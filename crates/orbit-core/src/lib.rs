pub mod advisor;
pub mod category;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod persistence;
pub mod render;
pub mod session;
pub mod stats;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use advisor::{
  Advisor,
  CannedSuggestions,
  Suggestion,
  SuggestionHandle,
  SuggestionSource
};
pub use category::{
  Category,
  CategoryRegistry
};
pub use datastore::{
  FileKvStore,
  KvStore,
  MemoryKvStore
};
pub use filter::{
  CategoryFilter,
  StatusFilter
};
pub use persistence::Persistence;
pub use session::{
  AdvisoryPolicy,
  Session
};
pub use stats::{
  CategoryCount,
  Stats
};
pub use store::TaskStore;
pub use task::{
  Priority,
  Task,
  TaskDraft,
  TaskId
};

#[tracing::instrument(skip_all)]
pub async fn run(
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
    "starting orbit CLI"
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

  let backend =
    FileKvStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open datastore at \
           {}",
          data_dir.display()
        )
      })?;

  let store =
    TaskStore::open(Persistence::with_key(
      backend,
      &cfg.storage_key()
    ));
  let advisor = Advisor::new(
    CannedSuggestions::default(),
    cfg.advisor_delay()?
  );
  let mut session = Session::new(
    store,
    CategoryRegistry::default(),
    advisor,
    cfg.advisory_policy()?
  );

  let renderer =
    render::Renderer::new(&cfg)?;
  let command = cli.command.unwrap_or(
    cli::Command::List {
      view: cli::ViewArgs {
        status:   "all".to_string(),
        category: "all".to_string()
      }
    }
  );

  commands::dispatch(
    &mut session,
    &cfg,
    &renderer,
    command
  )
  .await?;

  info!("done");
  Ok(())
}
