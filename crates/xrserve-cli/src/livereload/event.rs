//! Live-reload events and their SSE wire frames.

use serde::Serialize;

/// A push notification for connected visualization pages.
///
/// Events are transient: a client that is not connected when one is
/// broadcast simply misses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveReloadEvent {
    /// Full page reload (ignored by pages holding a 3D scene)
    Reload,
    /// Re-fetch data and rebuild charts without reloading
    AnalysisUpdated,
    /// Lighter data-only refresh
    DataRefresh,
    /// New markup for DOM visualizations
    HtmlUpdated { html: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HtmlPayload<'a> {
    html_content: &'a str,
}

impl LiveReloadEvent {
    /// SSE frame for this event, terminated by the blank line.
    pub fn frame(&self) -> String {
        match self {
            LiveReloadEvent::Reload => "data: reload\n\n".to_string(),
            LiveReloadEvent::AnalysisUpdated => "event: analysisUpdated\ndata: updated\n\n".to_string(),
            LiveReloadEvent::DataRefresh => "event: dataRefresh\ndata: refreshed\n\n".to_string(),
            LiveReloadEvent::HtmlUpdated { html } => {
                // serde_json escapes newlines, so the payload stays on one data line.
                let payload = serde_json::to_string(&HtmlPayload { html_content: html })
                    .unwrap_or_else(|_| "{}".to_string());
                format!("event: htmlUpdated\ndata: {}\n\n", payload)
            }
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LiveReloadEvent::Reload => "reload",
            LiveReloadEvent::AnalysisUpdated => "analysisUpdated",
            LiveReloadEvent::DataRefresh => "dataRefresh",
            LiveReloadEvent::HtmlUpdated { .. } => "htmlUpdated",
        }
    }
}
