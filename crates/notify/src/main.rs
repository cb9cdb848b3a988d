//! oncall-notify - post who is on call in Opsgenie to a Mattermost channel.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use config::Settings;
use notify::{channel_from_settings, Notifier, Week};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status for setup errors (credentials, configuration, clients).
const EXIT_SETUP: u8 = 1;

/// Exit status when at least one message could not be delivered.
const EXIT_DELIVERY: u8 = 2;

/// oncall-notify - announce the on-call rotation in Mattermost.
#[derive(Parser)]
#[command(name = "oncall-notify")]
#[command(about = "Post who is on call in Opsgenie to a Mattermost channel")]
#[command(version)]
pub struct Cli {
    /// Query users who will be on call next week instead of this week
    #[arg(long)]
    next_week: bool,

    /// Configuration document
    #[arg(long, env = "ONCALL_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print the webhook payloads instead of posting them
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("notify=debug,config=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_SETUP)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(&cli.config, |name| std::env::var(name).ok())
        .with_context(|| format!("cannot start with config {}", cli.config.display()))?;

    let notifier = Notifier::from_settings(&settings)?;
    let week = Week::from_next_week(cli.next_week);
    let now = Utc::now();

    info!(
        week = ?week,
        config = %cli.config.display(),
        dry_run = cli.dry_run,
        "Collecting on-call users"
    );

    if cli.dry_run {
        let roster = notifier.collect(week, now).await;
        let channel = channel_from_settings(&settings)?;
        let payloads: Vec<_> = notifier
            .messages(&roster)
            .iter()
            .map(|message| channel.render(message))
            .collect();

        let output = serde_json::json!({
            "roster": roster.summary(),
            "payloads": payloads,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    let report = notifier.run(week, now).await;

    if report.delivered() {
        println!("Successfully sent on-call users to Mattermost channel.");
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &report.failures {
            eprintln!("Error sending webhook: {failure}");
        }
        Ok(ExitCode::from(EXIT_DELIVERY))
    }
}
