use chrono::{DateTime, Local};
use metricops_common::{DqFailure, DqLatest, NumberFormat, MISSING};
use tabled::builder::Builder;

use super::{numeric_table, panel_header, RenderContext};
use crate::dashboard::{DqSnapshot, PanelState};

pub const NOT_RUN: &str = "Run Data Quality to populate.";
pub const NO_FAILURES: &str = "No failures in the latest run.";

/// Latest-run card
pub fn render_latest(ctx: &RenderContext, latest: &DqLatest) -> String {
    let lines = [
        format!("Status:  {}", ctx.palette.status(latest.status)),
        format!("Run:     #{} at {}", latest.run_id, latest.run_ts),
        format!("Source:  {}", latest.source),
        format!(
            "Checks:  {} total, {} passed, {} failed",
            latest.checks_total, latest.checks_passed, latest.checks_failed
        ),
    ];
    lines.join("\n")
}

fn measure(format: &NumberFormat, value: Option<f64>) -> String {
    format.optional(value, |f, v| f.decimal(v, 4))
}

/// Failed checks as a table
pub fn render_failures(ctx: &RenderContext, failures: &[DqFailure]) -> String {
    if failures.is_empty() {
        return ctx.palette.muted(NO_FAILURES);
    }

    let mut builder = Builder::default();
    builder.push_record(["Check", "Severity", "Value", "Threshold", "Details"]);
    for failure in failures {
        builder.push_record([
            failure.check_name.clone(),
            ctx.palette.error(&failure.severity),
            measure(&ctx.format, failure.metric_value),
            measure(&ctx.format, failure.threshold_value),
            failure.details.clone().unwrap_or_else(|| MISSING.to_string()),
        ]);
    }
    format!("Failures ({})\n{}", failures.len(), numeric_table(builder))
}

/// Data-quality panel
pub fn render(
    ctx: &RenderContext,
    snapshot: Option<&DqSnapshot>,
    state: PanelState,
    updated_at: Option<DateTime<Local>>,
) -> String {
    let header = panel_header(ctx, "Data Quality", state, updated_at);
    match snapshot {
        Some(snapshot) => format!(
            "{}\n{}\n\n{}",
            header,
            render_latest(ctx, &snapshot.latest),
            render_failures(ctx, &snapshot.failures.failures)
        ),
        None => format!("{}\n{}", header, ctx.palette.muted(NOT_RUN)),
    }
}
