use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use metricops_common::config::expand_path;
use metricops_common::DashboardConfig;
use std::process;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod dashboard;
mod render;

use commands::Commands;
use render::{Palette, RenderContext};

#[derive(Parser)]
#[command(name = "metricops")]
#[command(about = "MetricOps analytics dashboard client")]
#[command(version)]
struct Cli {
    /// Base URL of the metrics API
    #[arg(long, global = true, env = "METRICOPS_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Configuration file (default: ./metricops.toml, then ~/.metricops/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let default_filter = format!(
        "metricops={level},metricops_client={level},metricops_common={level}"
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<DashboardConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = expand_path(path);
            DashboardConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => DashboardConfig::load().context("Failed to load configuration")?,
    };

    if let Some(url) = &cli.api_base_url {
        config.api_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if cli.no_color {
        config.color = false;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    debug!(?config, "Loaded configuration");

    let color = config.color && console::Term::stdout().features().colors_supported();
    colored::control::set_override(color);
    let ctx = RenderContext::new(Palette::new(color), config.number_format());

    commands::handle_command(cli.command, &config, &ctx).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
