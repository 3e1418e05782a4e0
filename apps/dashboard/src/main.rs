mod config;
mod render;

use std::{path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{DashboardSession, DispatchOutcome};
use shared::domain::CommandAction;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::{config::load_settings, render::render_dashboard};

/// Operator console for the instrument middleware backend.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; missing files are ignored.
    #[arg(long, global = true, default_value = "dashboard.toml")]
    config: PathBuf,
    /// Backend base address; overrides profile resolution.
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// `production` or `development`.
    #[arg(long, global = true)]
    profile: Option<String>,
    /// Origin the dashboard is served from, used in production.
    #[arg(long, global = true)]
    origin: Option<String>,
    #[arg(long, global = true)]
    sample_limit: Option<u32>,
    #[arg(long, global = true)]
    refresh_interval_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load everything once and print the table.
    Status,
    /// Keep the table current until Ctrl-C.
    Watch,
    Start { machine: String },
    Stop { machine: String },
    /// Print the machine's log link.
    Logs {
        machine: String,
        #[arg(long)]
        open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(api_base) = args.api_base {
        settings.api_base = Some(api_base);
    }
    if let Some(profile) = args.profile.as_deref() {
        settings.profile = profile.parse()?;
    }
    if let Some(origin) = args.origin {
        settings.origin = Some(origin);
    }
    if let Some(limit) = args.sample_limit {
        settings.sample_limit = limit;
    }
    if let Some(interval) = args.refresh_interval_ms {
        settings.refresh_interval_ms = interval;
    }
    let client_config = settings.client_config()?;
    info!(api_base = %client_config.api_base, "resolved backend address");

    match args.command {
        Command::Status => status(DashboardSession::new(client_config)?).await,
        Command::Watch => watch(DashboardSession::new(client_config)?).await,
        Command::Start { machine } => {
            command(DashboardSession::new(client_config)?, &machine, CommandAction::Start).await
        }
        Command::Stop { machine } => {
            command(DashboardSession::new(client_config)?, &machine, CommandAction::Stop).await
        }
        Command::Logs { machine, open } => {
            let session = DashboardSession::new(client_config)?;
            let Some(url) = session.log_url(&machine) else {
                bail!("cannot build a log link for {machine}");
            };
            println!("{url}");
            if open {
                open::that(url.as_str()).with_context(|| format!("failed to open {url}"))?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn status(session: DashboardSession) -> Result<ExitCode> {
    session.reload().await;
    let view = session.view();
    print!("{}", render_dashboard(&view));
    session.teardown();
    Ok(if view.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn watch(mut session: DashboardSession) -> Result<ExitCode> {
    let mut changes = session.subscribe();
    session.start().await;
    redraw(&session);

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    debug!(?change, "store changed");
                    // Coalesce a burst of slice updates into one redraw.
                    while changes.try_recv().is_ok() {}
                    redraw(&session);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "change feed lagged");
                    redraw(&session);
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    session.teardown();
    Ok(ExitCode::SUCCESS)
}

fn redraw(session: &DashboardSession) {
    print!("\x1b[2J\x1b[H{}", render_dashboard(&session.view()));
}

async fn command(
    session: DashboardSession,
    machine: &str,
    action: CommandAction,
) -> Result<ExitCode> {
    session.reload().await;
    let outcome = session.request(machine, action).await?;
    let view = session.view();
    print!("{}", render_dashboard(&view));
    session.teardown();

    match outcome {
        DispatchOutcome::Completed { echoed } => {
            let state = echoed.map_or_else(|| "unreported".to_string(), |s| s.to_string());
            println!("{action} {machine}: accepted (reported state: {state})");
            Ok(ExitCode::SUCCESS)
        }
        DispatchOutcome::Failed { message } => {
            eprintln!("{action} {machine} failed: {message}");
            Ok(ExitCode::FAILURE)
        }
        DispatchOutcome::Rejected => {
            eprintln!("{action} {machine}: a command is already in flight");
            Ok(ExitCode::FAILURE)
        }
    }
}
