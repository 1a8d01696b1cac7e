use serde::Serialize;

use super::RenderContext;

pub const EMPTY_TEXT: &str = "No data yet.";

/// Pretty-printed JSON of `data` under a title, or `empty_text` when absent.
pub fn render<T: Serialize>(
    ctx: &RenderContext,
    title: &str,
    data: Option<&T>,
    empty_text: Option<&str>,
) -> String {
    let body = match data.map(serde_json::to_string_pretty) {
        Some(Ok(json)) => json,
        Some(Err(e)) => ctx.palette.error(&format!("Cannot serialize payload: {}", e)),
        None => ctx.palette.muted(empty_text.unwrap_or(EMPTY_TEXT)),
    };
    format!("{}\n{}", ctx.palette.heading(title), body)
}
