use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use metricops_client::{ApiClient, MetricsApi};
use metricops_common::{parse_date, validate_top_n, DashboardConfig, Dimension};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::dashboard::{Dashboard, PanelId, Selection};
use crate::render::{self, catalog, dq_panel, drivers_table, json_panel, kpi_cards, RenderContext};

/// Exit code when at least one panel failed to load
pub const EXIT_PANEL_ERROR: i32 = 2;

#[derive(Subcommand)]
pub enum Commands {
    /// List the certified metric catalog
    Metrics {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Compare the tracked KPIs between two dates
    Kpi {
        #[command(flatten)]
        dates: DateArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Break a metric's change down by a dimension
    Why {
        #[command(flatten)]
        selection: WhyArgs,
        #[command(flatten)]
        dates: DateArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show the latest data-quality run and its failed checks
    Dq {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Load every panel at once
    Dashboard {
        #[command(flatten)]
        selection: WhyArgs,
        #[command(flatten)]
        dates: DateArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Check API and database liveness
    Health {
        #[command(flatten)]
        output: OutputArgs,
    },
}

fn parse_date_arg(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(raw).map_err(|e| e.to_string())
}

fn parse_dimension(raw: &str) -> std::result::Result<Dimension, String> {
    raw.parse::<Dimension>().map_err(|e| e.to_string())
}

fn parse_top_n(raw: &str) -> std::result::Result<u32, String> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a positive integer", raw))?;
    validate_top_n(value).map_err(|e| e.to_string())
}

#[derive(Args, Debug, Clone, Default)]
pub struct DateArgs {
    /// Earlier date (YYYY-MM-DD); the API picks one when omitted
    #[arg(long, value_parser = parse_date_arg)]
    pub d1: Option<NaiveDate>,
    /// Later date (YYYY-MM-DD); the API picks one when omitted
    #[arg(long, value_parser = parse_date_arg)]
    pub d2: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WhyArgs {
    /// Metric key from the catalog
    #[arg(short, long)]
    pub metric: Option<String>,
    /// Dimension to break the metric down by
    #[arg(short, long, value_parser = parse_dimension)]
    pub dimension: Option<Dimension>,
    /// Number of driver rows (1-200)
    #[arg(short = 'n', long, value_parser = parse_top_n)]
    pub top_n: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Also print the raw payload
    #[arg(long)]
    pub debug: bool,
}

fn print_json<T: Serialize>(data: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Report panel errors on stderr and pick the exit code.
fn finish<A: MetricsApi>(ctx: &RenderContext, dashboard: &Dashboard<A>) -> i32 {
    let mut code = 0;
    for (panel, message) in dashboard.errors() {
        eprintln!("{}", render::error_banner(ctx, panel, message));
        code = EXIT_PANEL_ERROR;
    }
    code
}

fn apply_selection<A: MetricsApi>(
    dashboard: &mut Dashboard<A>,
    args: &WhyArgs,
    dates: &DateArgs,
) -> metricops_common::Result<()> {
    if let Some(metric) = &args.metric {
        let known = dashboard
            .catalog()
            .map(|c| c.find(metric).is_some())
            .unwrap_or(true);
        if !known {
            warn!(metric = %metric, "metric is not in the catalog");
        }
        dashboard.select_metric(metric.clone());
    }
    if let Some(dimension) = args.dimension {
        dashboard.set_dimension(dimension);
    }
    if let Some(top_n) = args.top_n {
        dashboard.set_top_n(top_n)?;
    }
    dashboard.set_dates(dates.d1, dates.d2);
    Ok(())
}

/// Run one subcommand against the configured API; returns the exit code.
pub async fn handle_command(command: Commands, config: &DashboardConfig, ctx: &RenderContext) -> Result<i32> {
    let api = ApiClient::from_config(config)
        .with_context(|| format!("Cannot use API base URL {}", config.api_base_url))?;
    info!(base_url = api.base_url(), "Using metrics API");
    let mut dashboard = Dashboard::new(api, Selection::from_config(config));
    run(command, &mut dashboard, ctx).await
}

/// Command logic over any [`MetricsApi`]
pub async fn run<A: MetricsApi>(command: Commands, dashboard: &mut Dashboard<A>, ctx: &RenderContext) -> Result<i32> {
    match command {
        Commands::Metrics { output } => {
            dashboard.load_catalog().await;
            if let Some(catalog) = dashboard.catalog() {
                match output.format {
                    OutputFormat::Json => print_json(catalog)?,
                    OutputFormat::Table => {
                        let selected = dashboard.selection().metric_key.clone();
                        println!("{}", catalog::render(ctx, catalog, Some(&selected)));
                    }
                }
            }
        }
        Commands::Kpi { dates, output } => {
            dashboard.set_dates(dates.d1, dates.d2);
            dashboard.run_kpi().await;
            if let Some(summary) = dashboard.kpi().data() {
                match output.format {
                    OutputFormat::Json => print_json(summary)?,
                    OutputFormat::Table => {
                        let panel = dashboard.kpi();
                        println!("{}", kpi_cards::render(ctx, Some(summary), panel.state(), panel.updated_at()));
                        if output.debug {
                            println!("\n{}", json_panel::render(ctx, "Raw response", Some(summary), None));
                        }
                    }
                }
            }
        }
        Commands::Why { selection, dates, output } => {
            dashboard.load_catalog().await;
            apply_selection(dashboard, &selection, &dates)?;
            dashboard.run_why().await;
            if let Some(response) = dashboard.why().data() {
                match output.format {
                    OutputFormat::Json => print_json(response)?,
                    OutputFormat::Table => {
                        let panel = dashboard.why();
                        let top_n = Some(dashboard.selection().top_n as usize);
                        println!(
                            "{}",
                            drivers_table::render(ctx, Some(response), top_n, panel.state(), panel.updated_at())
                        );
                        if output.debug {
                            println!("\n{}", json_panel::render(ctx, "Raw response", Some(response), None));
                        }
                    }
                }
            }
        }
        Commands::Dq { output } => {
            dashboard.run_dq().await;
            if let Some(snapshot) = dashboard.dq().data() {
                match output.format {
                    OutputFormat::Json => print_json(snapshot)?,
                    OutputFormat::Table => {
                        let panel = dashboard.dq();
                        println!("{}", dq_panel::render(ctx, Some(snapshot), panel.state(), panel.updated_at()));
                        if output.debug {
                            println!("\n{}", json_panel::render(ctx, "DQ Latest JSON", dashboard.dq_latest(), None));
                            println!("\n{}", json_panel::render(ctx, "DQ Failures JSON", dashboard.dq_failures(), None));
                        }
                    }
                }
            }
        }
        Commands::Dashboard { selection, dates, output } => {
            dashboard.load_catalog().await;
            apply_selection(dashboard, &selection, &dates)?;
            dashboard.set_show_debug(output.debug);
            dashboard.run_all().await;
            match output.format {
                OutputFormat::Json => print_json(&dashboard_json(dashboard))?,
                OutputFormat::Table => {
                    // Banners are part of the rendered dashboard
                    println!("{}", render::render_dashboard(ctx, dashboard));
                    return Ok(if dashboard.has_errors() { EXIT_PANEL_ERROR } else { 0 });
                }
            }
        }
        Commands::Health { output } => {
            let health = dashboard.api().health().await.context("Health check failed")?;
            match output.format {
                OutputFormat::Json => print_json(&health)?,
                OutputFormat::Table => {
                    println!("Status: {}", health.status);
                    println!(
                        "Database: {}",
                        if health.db == Some(1) { "reachable" } else { "unreachable" }
                    );
                    if let Some(env) = &health.env {
                        println!("Environment: {}", env);
                    }
                }
            }
        }
    }

    Ok(finish(ctx, dashboard))
}

/// Every panel's payload plus active errors keyed by panel name
pub fn dashboard_json<A: MetricsApi>(dashboard: &Dashboard<A>) -> Value {
    let errors: Map<String, Value> = dashboard
        .errors()
        .map(|(panel, message)| (panel_key(panel).to_string(), Value::String(message.to_string())))
        .collect();
    let selection = dashboard.selection();
    json!({
        "selection": {
            "metric_key": selection.metric_key,
            "dimension": selection.dimension,
            "top_n": selection.top_n,
            "d1": selection.d1,
            "d2": selection.d2,
        },
        "kpi_summary": dashboard.kpi().data(),
        "why_changed": dashboard.why().data(),
        "data_quality": dashboard.dq().data(),
        "errors": errors,
    })
}

fn panel_key(panel: PanelId) -> &'static str {
    match panel {
        PanelId::Catalog => "catalog",
        PanelId::Kpi => "kpi_summary",
        PanelId::Why => "why_changed",
        PanelId::Dq => "data_quality",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::tests::FakeApi;
    use crate::render::Palette;
    use clap::Parser;
    use metricops_common::NumberFormat;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    fn parse(args: &[&str]) -> std::result::Result<Commands, clap::Error> {
        let argv = std::iter::once("metricops").chain(args.iter().copied());
        TestCli::try_parse_from(argv).map(|cli| cli.command)
    }

    fn ctx() -> RenderContext {
        RenderContext::new(Palette::plain(), NumberFormat::default())
    }

    fn dashboard(api: FakeApi) -> Dashboard<FakeApi> {
        Dashboard::new(api, Selection::from_config(&DashboardConfig::default()))
    }

    #[test]
    fn why_arguments_are_validated() {
        assert!(parse(&["why", "--top-n", "0"]).is_err());
        assert!(parse(&["why", "--top-n", "201"]).is_err());
        assert!(parse(&["why", "--dimension", "region"]).is_err());
        assert!(parse(&["kpi", "--d1", "2024-13-01"]).is_err());

        match parse(&["why", "-m", "gross_sales", "-d", "ship-service-level", "-n", "5", "--d2", "2024-01-02"]).unwrap() {
            Commands::Why { selection, dates, output } => {
                assert_eq!(selection.metric.as_deref(), Some("gross_sales"));
                assert_eq!(selection.dimension, Some(Dimension::ShipServiceLevel));
                assert_eq!(selection.top_n, Some(5));
                assert_eq!(dates.d1, None);
                assert_eq!(dates.d2, NaiveDate::from_ymd_opt(2024, 1, 2));
                assert_eq!(output.format, OutputFormat::Table);
            }
            _ => panic!("expected why"),
        }
    }

    #[test]
    fn output_format_parses() {
        match parse(&["dq", "--format", "json"]).unwrap() {
            Commands::Dq { output } => assert_eq!(output.format, OutputFormat::Json),
            _ => panic!("expected dq"),
        }
        assert!(parse(&["dq", "--format", "yaml"]).is_err());
    }

    #[tokio::test]
    async fn failed_panel_exits_with_panel_error_code() {
        let mut dash = dashboard(FakeApi::loaded().failing("/kpi-summary", 500, "boom"));
        let code = run(parse(&["kpi"]).unwrap(), &mut dash, &ctx()).await.unwrap();
        assert_eq!(code, EXIT_PANEL_ERROR);

        let mut dash = dashboard(FakeApi::loaded());
        let code = run(parse(&["kpi"]).unwrap(), &mut dash, &ctx()).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn why_applies_explicit_selection_after_catalog() {
        let mut dash = dashboard(FakeApi::loaded());
        let command = parse(&["why", "--metric", "gross_sales", "--dimension", "category", "--top-n", "3"]).unwrap();
        let code = run(command, &mut dash, &ctx()).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(dash.selection().metric_key, "gross_sales");
        let query = dash.why_query();
        assert_eq!(query.top_n, 3);
        assert_eq!(query.dimension, Dimension::Category);
    }

    #[tokio::test]
    async fn dashboard_json_keys_errors_by_panel() {
        let mut dash = dashboard(FakeApi::loaded().failing("/why-changed", 500, "boom"));
        dash.load_catalog().await;
        dash.run_all().await;
        let value = dashboard_json(&dash);
        assert_eq!(value["selection"]["dimension"], "ship_state");
        assert_eq!(value["kpi_summary"]["d1"], "2024-01-01");
        assert!(value["why_changed"].is_null());
        assert_eq!(value["data_quality"]["latest"]["run_id"], 3);
        assert!(value["errors"]["why_changed"].as_str().unwrap().contains("boom"));
    }
}
