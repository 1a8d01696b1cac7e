use chrono::{DateTime, Local};
use metricops_common::{AdditiveDriver, Drivers, NumberFormat, RateDriver, Tone, WhyChangedResponse};
use tabled::builder::Builder;

use super::{numeric_table, panel_header, RenderContext};
use crate::dashboard::PanelState;

pub const NOT_RUN: &str = "Run Why Changed to populate.";
pub const NO_DRIVERS: &str = "No drivers returned for this metric, dimension and date range.";

const ADDITIVE_HEADER: [&str; 5] = ["Value", "D1", "D2", "Δ", "% Change"];
const RATE_HEADER: [&str; 6] = ["Value", "Rate D1", "Rate D2", "Δ (pp)", "Cancelled/Total D1", "Cancelled/Total D2"];

/// Table rows for one response, before styling
#[derive(Debug, Clone, PartialEq)]
pub struct DriversView {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Tone of each row's delta cell
    pub tones: Vec<Tone>,
    /// Column holding the delta
    pub delta_column: usize,
}

fn dim_label(value: &str) -> String {
    if value.is_empty() {
        "(blank)".to_string()
    } else {
        value.to_string()
    }
}

fn additive_row(format: &NumberFormat, row: &AdditiveDriver) -> (Vec<String>, Tone) {
    let delta = format.signed(Some(row.delta), |f, v| f.decimal(v, 2));
    let pct = format.signed(row.pct_change, |f, v| f.percent(v));
    (
        vec![
            dim_label(&row.dim_value),
            format.decimal(row.value_d1, 2),
            format.decimal(row.value_d2, 2),
            delta.text,
            pct.text,
        ],
        delta.tone,
    )
}

fn rate_row(format: &NumberFormat, row: &RateDriver) -> (Vec<String>, Tone) {
    let delta = format.signed(Some(row.rate_delta), |f, v| f.percentage_points(v));
    (
        vec![
            dim_label(&row.dim_value),
            format.optional(row.rate_d1, |f, v| f.percent(v)),
            format.optional(row.rate_d2, |f, v| f.percent(v)),
            delta.text,
            format!("{}/{}", format.count(row.cancelled_d1), format.count(row.total_d1)),
            format!("{}/{}", format.count(row.cancelled_d2), format.count(row.total_d2)),
        ],
        delta.tone,
    )
}

impl DriversView {
    /// Rank `drivers` by absolute delta, keep `top_n` rows and lay them out
    /// for their metric type.
    pub fn build(format: &NumberFormat, drivers: &Drivers, top_n: Option<usize>) -> Self {
        let ranked = drivers.ranked(top_n);
        let (header, pairs): (&[&str], Vec<(Vec<String>, Tone)>) = match &ranked {
            Drivers::Additive(rows) => (
                &ADDITIVE_HEADER[..],
                rows.iter().map(|r| additive_row(format, r)).collect(),
            ),
            Drivers::Rate(rows) => (
                &RATE_HEADER[..],
                rows.iter().map(|r| rate_row(format, r)).collect(),
            ),
        };
        let (rows, tones) = pairs.into_iter().unzip();
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows,
            tones,
            delta_column: 3,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim_values(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r[0].as_str()).collect()
    }

    pub fn to_table(&self, ctx: &RenderContext) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.header.clone());
        for (row, tone) in self.rows.iter().zip(&self.tones) {
            let mut row = row.clone();
            row[self.delta_column] = ctx.palette.tone(&row[self.delta_column], *tone);
            builder.push_record(row);
        }
        numeric_table(builder).to_string()
    }
}

/// Body of the why-changed panel for a loaded response
pub fn render_response(ctx: &RenderContext, response: &WhyChangedResponse, top_n: Option<usize>) -> String {
    let title = format!(
        "Drivers for {} by {}",
        response.metric_key, response.dimension
    );
    let view = DriversView::build(&ctx.format, &response.drivers, top_n);
    let body = if view.is_empty() {
        ctx.palette.muted(NO_DRIVERS)
    } else {
        view.to_table(ctx)
    };
    format!("{}\n{}", title, body)
}

/// Why-changed panel; a placeholder until the action has run.
pub fn render(
    ctx: &RenderContext,
    response: Option<&WhyChangedResponse>,
    top_n: Option<usize>,
    state: PanelState,
    updated_at: Option<DateTime<Local>>,
) -> String {
    let header = panel_header(ctx, "Why Changed", state, updated_at);
    let body = match response {
        Some(response) => render_response(ctx, response, top_n),
        None => ctx.palette.muted(NOT_RUN),
    };
    format!("{}\n{}", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Palette;
    use metricops_common::Grouping;
    use serde_json::json;

    fn ctx() -> RenderContext {
        RenderContext::new(Palette::plain(), NumberFormat::new(Grouping::Western, "$"))
    }

    fn response(drivers: serde_json::Value) -> WhyChangedResponse {
        serde_json::from_value(json!({
            "metric_key": "orders_sold",
            "dimension": "ship_state",
            "summary": {"d1": "2024-01-01", "d2": "2024-01-02"},
            "drivers": drivers
        }))
        .unwrap()
    }

    fn additive(n: usize) -> Drivers {
        let rows: Vec<_> = (0..n)
            .map(|i| {
                let delta = i as f64 - 5.0;
                json!({"dim_value": format!("S{}", i), "value_d1": 10.0, "value_d2": 10.0 + delta, "delta": delta, "pct_change": delta / 10.0})
            })
            .collect();
        response(serde_json::Value::Array(rows)).drivers
    }

    #[test]
    fn rows_are_capped_at_top_n() {
        let fmt = NumberFormat::default();
        for (len, top_n) in [(12, 10), (3, 10), (0, 5), (8, 8)] {
            let view = DriversView::build(&fmt, &additive(len), Some(top_n));
            assert_eq!(view.rows.len(), len.min(top_n));
        }
    }

    #[test]
    fn rows_are_ranked_by_absolute_delta() {
        let drivers = response(json!([
            {"dim_value": "GOA", "value_d1": 3, "value_d2": 2, "delta": -1, "pct_change": -0.3333},
            {"dim_value": "KERALA", "value_d1": 2, "value_d2": 6, "delta": 4, "pct_change": 2.0},
            {"dim_value": "DELHI", "value_d1": 8, "value_d2": 2, "delta": -6, "pct_change": -0.75}
        ]))
        .drivers;
        let view = DriversView::build(&NumberFormat::default(), &drivers, None);
        assert_eq!(view.dim_values(), vec!["DELHI", "KERALA", "GOA"]);
        assert_eq!(view.tones, vec![Tone::Negative, Tone::Positive, Tone::Negative]);
        assert_eq!(view.rows[1][3], "+4");
        assert_eq!(view.rows[1][4], "+200%");
        assert_eq!(view.rows[2][4], "-33.33%");
    }

    #[test]
    fn rate_rows_use_rate_layout() {
        let drivers = response(json!([
            {"dim_value": "KERALA", "cancelled_d1": 2, "total_d1": 20, "rate_d1": 0.1,
             "cancelled_d2": 5, "total_d2": 25, "rate_d2": 0.2, "rate_delta": 0.1},
            {"dim_value": "GOA", "cancelled_d1": 0, "total_d1": 0, "rate_d1": null,
             "cancelled_d2": 1, "total_d2": 4, "rate_d2": 0.25, "rate_delta": 0.0}
        ]))
        .drivers;
        let view = DriversView::build(&NumberFormat::default(), &drivers, Some(10));
        assert_eq!(view.header[1], "Rate D1");
        assert_eq!(view.rows[0], vec!["KERALA", "10%", "20%", "+10 pp", "2/20", "5/25"]);
        assert_eq!(view.rows[1][1], "—");
        assert_eq!(view.tones[1], Tone::Neutral);
    }

    #[test]
    fn placeholder_before_first_run() {
        let out = render(&ctx(), None, Some(10), PanelState::Idle, None);
        assert!(out.contains(NOT_RUN));
        assert!(!out.contains('╭'));
    }

    #[test]
    fn empty_drivers_get_a_message_not_a_table() {
        let out = render_response(&ctx(), &response(json!([])), Some(10));
        assert!(out.starts_with("Drivers for orders_sold by ship_state"));
        assert!(out.contains(NO_DRIVERS));
        assert!(!out.contains('╭'));
    }

    #[test]
    fn loaded_response_renders_table() {
        let drivers = json!([{"dim_value": "", "value_d1": 1, "value_d2": 3, "delta": 2, "pct_change": 2.0}]);
        let out = render_response(&ctx(), &response(drivers), Some(10));
        assert!(out.contains('╭'));
        assert!(out.contains("(blank)"));
        assert!(out.contains("% Change"));
    }
}
