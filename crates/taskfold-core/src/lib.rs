pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod projection;
pub mod render;
pub mod store;

use std::ffi::OsString;
use std::sync::Arc;

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
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskfold CLI"
  );
  debug!(?cli.rc_overrides, "rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  if let Some(url) = cli.api_url {
    cfg.apply_overrides([(
      config::KEY_API_URL.to_string(),
      url
    )]);
  }

  let api_url = cfg.api_url();
  let gateway = gateway::HttpGateway::new(
    &api_url,
    cfg.api_timeout()?
  )
  .with_context(|| {
    format!(
      "failed to configure remote \
       store at {api_url}"
    )
  })?;
  let store = store::EntityStore::new(
    Arc::new(gateway)
  );

  let mut renderer =
    render::Renderer::new(&cfg)?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let outcome =
    runtime.block_on(commands::dispatch(
      &store,
      &mut renderer,
      cli.command.unwrap_or_default()
    ));
  store.teardown();
  outcome?;

  info!("done");
  Ok(())
}
