use metricops_common::{MetricsResponse, MISSING};
use tabled::builder::Builder;
use tabled::settings::Style;

use super::RenderContext;

/// Metric catalog, marking `selected` with `*`
pub fn render(ctx: &RenderContext, catalog: &MetricsResponse, selected: Option<&str>) -> String {
    if catalog.metrics.is_empty() {
        return ctx.palette.muted("The catalog has no metrics.");
    }

    let mut builder = Builder::default();
    builder.push_record(["", "Key", "Name", "Type", "Description"]);
    for metric in &catalog.metrics {
        let marker = if selected == Some(metric.metric_key.as_str()) { "*" } else { "" };
        builder.push_record([
            marker.to_string(),
            metric.metric_key.clone(),
            metric.metric_name.clone(),
            metric.metric_type.to_string(),
            metric.description.clone().unwrap_or_else(|| MISSING.to_string()),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    format!("{}\n{}", ctx.palette.heading("Metrics"), table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Palette;
    use metricops_common::NumberFormat;

    #[test]
    fn marks_selected_metric() {
        let catalog: MetricsResponse = serde_json::from_value(serde_json::json!({
            "metrics": [
                {"metric_key": "gross_sales", "metric_name": "Gross Sales", "metric_type": "ADDITIVE", "description": null},
                {"metric_key": "cancellation_rate", "metric_name": "Cancellation Rate", "metric_type": "RATE", "description": "cancelled / total"}
            ]
        }))
        .unwrap();
        let ctx = RenderContext::new(Palette::plain(), NumberFormat::default());
        let out = render(&ctx, &catalog, Some("cancellation_rate"));
        let line = out.lines().find(|l| l.contains("cancellation_rate")).unwrap();
        assert!(line.contains('*'));
        assert!(line.contains("RATE"));
        let line = out.lines().find(|l| l.contains("gross_sales")).unwrap();
        assert!(!line.contains('*'));
    }
}
