pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod facade;
pub mod filter;
pub mod host;
pub mod model;
pub mod prefs;
pub mod render;
pub mod router;
pub mod session;
pub mod views;
pub mod widgets;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting portal CLI");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.portalrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );
    if let Some(token) = &cli.token {
        cfg.set("backend.token", token);
    }

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;
    let renderer = render::Renderer::new(&cfg)?;
    let settings = cfg.settings();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let mut portal = app::Portal::open(&settings, &data_dir)
            .with_context(|| format!("failed to open portal at {}", data_dir.display()))?;
        let stdout = std::io::stdout();
        commands::dispatch(&mut portal, &renderer, cli.command, stdout.lock()).await
    })?;

    info!("done");
    Ok(())
}
