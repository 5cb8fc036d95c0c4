//! Server-rendered metrics page.
//!
//! The view types carry pre-formatted strings so the Askama template stays
//! simple. Endpoint keys come straight from request paths; the template's
//! HTML escaping covers them.

use askama::Template;
use axum::response::Html;

use crate::metrics::query::{EndpointCount, MetricsReport};

pub struct PeriodRow {
    pub label: &'static str,
    pub count: u64,
    pub rpm: String,
    pub avg_latency: String,
}

/// One endpoint with a bar scaled to the most popular one.
pub struct EndpointRow {
    pub endpoint: String,
    pub count: u64,
    pub width_percent: String,
}

#[derive(Template)]
#[template(path = "metrics.html")]
pub struct MetricsTemplate {
    pub total_requests: u64,
    pub stored_event_count: usize,
    pub skipped_events: u64,
    pub periods: Vec<PeriodRow>,
    pub endpoints: Vec<EndpointRow>,
}

impl MetricsTemplate {
    pub fn from_report(report: &MetricsReport) -> Self {
        let periods = report
            .windows
            .iter()
            .map(|(window, stats)| PeriodRow {
                label: window.label(),
                count: stats.count,
                rpm: format!("{:.2}", stats.requests_per_minute),
                avg_latency: format!("{:.3}", stats.avg_latency_seconds),
            })
            .collect();

        Self {
            total_requests: report.total_requests,
            stored_event_count: report.stored_event_count,
            skipped_events: report.skipped_events,
            periods,
            endpoints: endpoint_rows(&report.top_endpoints),
        }
    }
}

fn endpoint_rows(endpoints: &[EndpointCount]) -> Vec<EndpointRow> {
    let max = endpoints.first().map_or(0, |e| e.count).max(1);
    endpoints
        .iter()
        .map(|e| EndpointRow {
            endpoint: e.endpoint.clone(),
            count: e.count,
            width_percent: format!("{:.1}", e.count as f64 / max as f64 * 100.0),
        })
        .collect()
}

pub fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(
        tmpl.render()
            .unwrap_or_else(|e| format!("<pre>Template error: {e}</pre>")),
    )
}
