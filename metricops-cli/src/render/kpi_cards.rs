use chrono::{DateTime, Local};
use metricops_common::{KpiReading, KpiSummary, NumberFormat, Signed, ValueKind, DATE_FORMAT};
use tabled::builder::Builder;

use super::{numeric_table, panel_header, RenderContext};
use crate::dashboard::PanelState;

/// A KPI value in its display unit
pub fn kpi_value(format: &NumberFormat, kind: ValueKind, value: Option<f64>) -> String {
    match kind {
        ValueKind::Currency { decimals } => format.optional(value, |f, v| f.currency(v, decimals)),
        ValueKind::Count => format.optional(value, |f, v| f.count(v)),
        ValueKind::Rate => format.optional(value, |f, v| f.percent(v)),
    }
}

/// A KPI delta with sign and tone; rate deltas read in percentage points.
pub fn kpi_delta(format: &NumberFormat, kind: ValueKind, delta: Option<f64>) -> Signed {
    match kind {
        ValueKind::Currency { decimals } => format.signed(delta, |f, v| f.currency(v, decimals)),
        ValueKind::Count => format.signed(delta, |f, v| f.count(v)),
        ValueKind::Rate => format.signed(delta, |f, v| f.percentage_points(v)),
    }
}

fn card_row(ctx: &RenderContext, reading: &KpiReading) -> Vec<String> {
    let kind = reading.kpi.kind();
    let delta = kpi_delta(&ctx.format, kind, reading.delta);
    vec![
        reading.kpi.label().to_string(),
        kpi_value(&ctx.format, kind, reading.d1),
        kpi_value(&ctx.format, kind, reading.d2),
        ctx.palette
            .tone(&format!("{} {}", delta.tone.arrow(), delta.text), delta.tone),
    ]
}

/// KPI table for one summary, without the panel header
pub fn render_summary(ctx: &RenderContext, summary: &KpiSummary) -> String {
    let d1 = summary.d1.format(DATE_FORMAT).to_string();
    let d2 = summary.d2.format(DATE_FORMAT).to_string();

    let mut builder = Builder::default();
    builder.push_record(["KPI".to_string(), d1.clone(), d2.clone(), "Δ".to_string()]);
    for reading in summary.readings() {
        builder.push_record(card_row(ctx, &reading));
    }

    format!(
        "{}\n{}",
        ctx.palette.muted(&format!("{} → {}", d1, d2)),
        numeric_table(builder)
    )
}

/// KPI summary panel; only the header while nothing has loaded.
pub fn render(
    ctx: &RenderContext,
    summary: Option<&KpiSummary>,
    state: PanelState,
    updated_at: Option<DateTime<Local>>,
) -> String {
    let header = panel_header(ctx, "KPI Summary", state, updated_at);
    match summary {
        Some(summary) => format!("{}\n{}", header, render_summary(ctx, summary)),
        None => header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Palette;
    use metricops_common::{Grouping, Tone};

    fn ctx() -> RenderContext {
        RenderContext::new(Palette::plain(), NumberFormat::new(Grouping::Western, "$"))
    }

    fn summary() -> KpiSummary {
        serde_json::from_value(serde_json::json!({
            "d1": "2024-01-01",
            "d2": "2024-01-02",
            "gross_sales_d1": 1000.0, "gross_sales_d2": 1150.0, "gross_sales_delta": 150.0,
            "orders_sold_d1": 10, "orders_sold_d2": 12, "orders_sold_delta": 2,
            "units_sold_d1": 20, "units_sold_d2": 18, "units_sold_delta": -2,
            "aov_d1": null, "aov_d2": 95.5, "aov_delta": null,
            "cancellation_rate_d1": 0.1, "cancellation_rate_d2": 0.0875, "cancellation_rate_delta": -0.0125
        }))
        .unwrap()
    }

    #[test]
    fn kpi_delta_tone_follows_sign() {
        let fmt = NumberFormat::new(Grouping::Western, "$");
        let kind = ValueKind::Currency { decimals: 0 };

        let up = kpi_delta(&fmt, kind, Some(150.0));
        assert_eq!(up.text, "+$150");
        assert_eq!(up.tone, Tone::Positive);

        let down = kpi_delta(&fmt, kind, Some(-150.0));
        assert_eq!(down.text, "-$150");
        assert_eq!(down.tone, Tone::Negative);

        let flat = kpi_delta(&fmt, kind, Some(0.0));
        assert_eq!(flat.tone, Tone::Neutral);
    }

    #[test]
    fn rate_kpis_use_percent_and_points() {
        let fmt = NumberFormat::default();
        assert_eq!(kpi_value(&fmt, ValueKind::Rate, Some(0.0875)), "8.75%");
        assert_eq!(kpi_delta(&fmt, ValueKind::Rate, Some(-0.0125)).text, "-1.25 pp");
    }

    #[test]
    fn summary_table_shows_every_kpi() {
        let out = render_summary(&ctx(), &summary());
        assert!(out.starts_with("2024-01-01 → 2024-01-02"));
        for label in ["Orders Sold", "Gross Sales", "Units Sold", "AOV", "Cancellation Rate"] {
            assert!(out.contains(label), "missing {}", label);
        }
        assert!(out.contains("$1,150"));
        assert!(out.contains("↑ +$150"));
        assert!(out.contains("↓ -2"));
        assert!(out.contains("$95.50"));
        assert!(out.contains("→ —"));
        assert!(out.contains("10%"));
    }

    #[test]
    fn nothing_loaded_renders_header_only() {
        let out = render(&ctx(), None, PanelState::Idle, None);
        assert_eq!(out, "KPI Summary  (Not run yet)");
    }
}
