//! Terminal rendering of dashboard panels
//!
//! Every renderer returns a `String` so output can be asserted on without a
//! terminal; the command layer prints it.

pub mod catalog;
pub mod dq_panel;
pub mod drivers_table;
pub mod json_panel;
pub mod kpi_cards;

use chrono::{DateTime, Local};
use colored::Colorize;
use metricops_client::MetricsApi;
use metricops_common::{DqStatus, NumberFormat, Tone, MISSING};
use tabled::settings::{object::Columns, Alignment, Style};
use tabled::{builder::Builder, Table};

use crate::dashboard::{Dashboard, PanelId, PanelState};

/// Optional ANSI styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    pub fn tone(&self, text: &str, tone: Tone) -> String {
        if !self.enabled {
            return text.to_string();
        }
        match tone {
            Tone::Positive => text.green().to_string(),
            Tone::Negative => text.red().to_string(),
            Tone::Neutral => text.dimmed().to_string(),
        }
    }

    pub fn heading(&self, text: &str) -> String {
        if self.enabled {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn muted(&self, text: &str) -> String {
        if self.enabled {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn error(&self, text: &str) -> String {
        if self.enabled {
            text.red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn status(&self, status: DqStatus) -> String {
        let text = status.to_string();
        if !self.enabled {
            return text;
        }
        match status {
            DqStatus::Passed => text.green().bold().to_string(),
            DqStatus::Failed => text.red().bold().to_string(),
            DqStatus::Unknown => text.yellow().to_string(),
        }
    }
}

/// Rendering settings shared by all panels
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub palette: Palette,
    pub format: NumberFormat,
}

impl RenderContext {
    pub fn new(palette: Palette, format: NumberFormat) -> Self {
        Self { palette, format }
    }
}

/// `Updated: <local time>` once a panel has loaded at least once
pub fn updated_label(updated_at: Option<DateTime<Local>>) -> String {
    match updated_at {
        Some(ts) => format!("Updated: {}", ts.format("%Y-%m-%d %H:%M:%S")),
        None => "Not run yet".to_string(),
    }
}

/// Panel title line with its refresh status
pub fn panel_header(
    ctx: &RenderContext,
    title: &str,
    state: PanelState,
    updated_at: Option<DateTime<Local>>,
) -> String {
    let status = match state {
        PanelState::Loading => "Loading…".to_string(),
        _ => updated_label(updated_at),
    };
    format!(
        "{}  {}",
        ctx.palette.heading(title),
        ctx.palette.muted(&format!("({})", status))
    )
}

pub fn error_banner(ctx: &RenderContext, panel: PanelId, message: &str) -> String {
    ctx.palette
        .error(&format!("{} failed: {}", panel.label(), message))
}

/// Rounded table with the first column left-aligned and the rest right-aligned
pub(crate) fn numeric_table(builder: Builder) -> Table {
    let mut table = builder.build();
    table
        .with(Style::rounded())
        .modify(Columns::new(1..), Alignment::right());
    table
}

/// Every panel of `dashboard`, top to bottom, with error banners first.
pub fn render_dashboard<A: MetricsApi>(ctx: &RenderContext, dashboard: &Dashboard<A>) -> String {
    let mut sections = Vec::new();

    for (panel, message) in dashboard.errors() {
        sections.push(error_banner(ctx, panel, message));
    }

    let selection = dashboard.selection();
    let metric_label = dashboard
        .selected_metric()
        .map(|m| {
            format!(
                "{} ({}) {}",
                m.metric_name,
                m.metric_type,
                ctx.palette.muted(m.description.as_deref().unwrap_or(MISSING))
            )
        })
        .unwrap_or_else(|| selection.metric_key.clone());
    sections.push(format!(
        "{} {}  {} {}  {} {}",
        ctx.palette.muted("Metric:"),
        metric_label,
        ctx.palette.muted("Dimension:"),
        selection.dimension.label(),
        ctx.palette.muted("Top N:"),
        selection.top_n
    ));

    let kpi = dashboard.kpi();
    sections.push(kpi_cards::render(ctx, kpi.data(), kpi.state(), kpi.updated_at()));

    let why = dashboard.why();
    sections.push(drivers_table::render(
        ctx,
        why.data(),
        Some(selection.top_n as usize),
        why.state(),
        why.updated_at(),
    ));

    let dq = dashboard.dq();
    sections.push(dq_panel::render(ctx, dq.data(), dq.state(), dq.updated_at()));

    if selection.show_debug {
        sections.push(json_panel::render(
            ctx,
            "Debug: KPI Summary",
            kpi.data(),
            None,
        ));
        sections.push(json_panel::render(
            ctx,
            "Debug: Why Changed",
            why.data(),
            None,
        ));
        sections.push(json_panel::render(
            ctx,
            "Debug: DQ Latest",
            dashboard.dq_latest(),
            None,
        ));
        sections.push(json_panel::render(
            ctx,
            "Debug: DQ Failures",
            dashboard.dq_failures(),
            None,
        ));
    }

    sections.join("\n\n")
}
