use anyhow::{bail, Context, Result};
use bount::Command;
use clap::Parser;
use common::config::load_config;
use log::info;
use stack::hooks::Hooks;
use stack::Lifecycle;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(name = "bount", about = "Deploys Django projects to Ubuntu hosts", version)]
struct Cli {
    /// Configuration file, read after the well-known locations
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Host to operate on; repeat for several. Defaults to every configured host
    #[clap(long = "host", global = true)]
    hosts: Vec<String>,

    #[clap(subcommand)]
    command: Command,
}

/// Console logging, forwarded to sentry when `BOUNT_SENTRY_DSN` is set.
fn init_logging() -> Result<Option<sentry::ClientInitGuard>> {
    let logger = env_logger::Builder::new()
        .format_timestamp(None)
        .format_level(true)
        .format_module_path(false)
        .format_indent(Some(4))
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .build();
    let level = logger.filter();

    let guard = match std::env::var("BOUNT_SENTRY_DSN") {
        Ok(dsn) if !dsn.is_empty() => Some(sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))),
        _ => None,
    };

    if guard.is_some() {
        log::set_boxed_logger(Box::new(sentry_log::SentryLogger::with_dest(logger)))?;
    } else {
        log::set_boxed_logger(Box::new(logger))?;
    }
    log::set_max_level(level);
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _sentry = init_logging()?;
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    let hosts = if cli.hosts.is_empty() {
        config.hosts.keys().cloned().collect::<Vec<_>>()
    } else {
        cli.hosts.clone()
    };
    if hosts.is_empty() {
        bail!("no hosts configured; add a [hosts.<id>] section");
    }
    if let Some(unknown) = hosts.iter().find(|host| !config.hosts.contains_key(*host)) {
        bail!("unknown host {}", unknown);
    }

    let registry = bount::registry(Arc::new(config));
    for host in &hosts {
        let stack = registry
            .get(host)
            .await
            .with_context(|| format!("failed to build the stack for {}", host))?;
        let lifecycle = Lifecycle::new(stack, Hooks::new());
        cli.command
            .run(&lifecycle)
            .await
            .with_context(|| format!("{:?} failed on {}", cli.command, host))?;
        info!("{} done", host);
    }

    Ok(())
}
