//! Windowed statistics and endpoint ranking over a `StoreState` copy.
//!
//! Nothing here takes a lock or mutates; every function can run while
//! ingestion continues on the live store.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store::StoreState;

// ─── Windows ─────────────────────────────────────────────────────

/// Fixed lookback windows, declared in ascending length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "last-hour")]
    LastHour,
    #[serde(rename = "last-day")]
    LastDay,
    #[serde(rename = "last-week")]
    LastWeek,
    #[serde(rename = "last-30-days")]
    Last30Days,
}

impl Window {
    pub const ALL: [Window; 4] = [
        Window::LastHour,
        Window::LastDay,
        Window::LastWeek,
        Window::Last30Days,
    ];

    pub fn duration(self) -> Duration {
        match self {
            Self::LastHour => Duration::hours(1),
            Self::LastDay => Duration::days(1),
            Self::LastWeek => Duration::weeks(1),
            Self::Last30Days => Duration::days(30),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LastHour => "last-hour",
            Self::LastDay => "last-day",
            Self::LastWeek => "last-week",
            Self::Last30Days => "last-30-days",
        }
    }

    /// Human label for dashboards.
    pub fn label(self) -> &'static str {
        match self {
            Self::LastHour => "Last Hour",
            Self::LastDay => "Last Day",
            Self::LastWeek => "Last Week",
            Self::Last30Days => "Last Month",
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────

/// Aggregates for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: u64,
    /// `count` over the window's nominal length, not the observed span.
    pub requests_per_minute: f64,
    /// 0 when no event matched.
    pub avg_latency_seconds: f64,
}

/// Output of `window_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub windows: BTreeMap<Window, WindowStats>,
    /// Retained events whose timestamp could not be parsed.
    pub skipped_events: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: u64,
}

/// Everything a presentation layer needs, computed from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub total_requests: u64,
    pub stored_event_count: usize,
    pub windows: BTreeMap<Window, WindowStats>,
    pub top_endpoints: Vec<EndpointCount>,
    pub skipped_events: u64,
}

// ─── Queries ─────────────────────────────────────────────────────

/// Count, rate and mean latency of the events newer than `now - window`
/// for each requested window.
///
/// A single pass over the history feeds every window. Windows longer than
/// the retained history silently under-report.
pub fn window_stats(state: &StoreState, now: DateTime<Utc>, windows: &[Window]) -> WindowReport {
    let cutoffs: Vec<DateTime<Utc>> = windows.iter().map(|w| now - w.duration()).collect();
    let mut counts = vec![0u64; windows.len()];
    let mut latency_sums = vec![0f64; windows.len()];
    let mut skipped_events = 0u64;

    for event in &state.recent_events {
        let at = match event.timestamp().instant() {
            Ok(at) => at,
            Err(e) => {
                skipped_events += 1;
                // Only the first one is worth a log line per query
                if skipped_events == 1 {
                    warn!(error = %e, endpoint = %event.endpoint_key(), "skipping event in window query");
                }
                continue;
            }
        };
        for (i, cutoff) in cutoffs.iter().enumerate() {
            if at > *cutoff {
                counts[i] += 1;
                latency_sums[i] += event.latency_seconds();
            }
        }
    }

    let windows = windows
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let count = counts[i];
            let minutes = w.duration().num_seconds() as f64 / 60.0;
            let avg = if count > 0 {
                latency_sums[i] / count as f64
            } else {
                0.0
            };
            (
                w,
                WindowStats {
                    count,
                    requests_per_minute: count as f64 / minutes,
                    avg_latency_seconds: avg,
                },
            )
        })
        .collect();

    WindowReport {
        windows,
        skipped_events,
    }
}

/// The `n` most requested endpoints, most popular first, ties by key.
pub fn top_endpoints(state: &StoreState, n: usize) -> Vec<EndpointCount> {
    let mut ranked: Vec<(&String, &u64)> = state.endpoint_counts.iter().collect();
    ranked.sort_unstable_by_key(|&(key, count)| (Reverse(*count), key));
    ranked
        .into_iter()
        .take(n)
        .map(|(key, count)| EndpointCount {
            endpoint: key.clone(),
            count: *count,
        })
        .collect()
}

/// Full report over every standard window.
pub fn metrics_report(state: &StoreState, now: DateTime<Utc>, top_n: usize) -> MetricsReport {
    let WindowReport {
        windows,
        skipped_events,
    } = window_stats(state, now, &Window::ALL);

    MetricsReport {
        generated_at: now,
        total_requests: state.total_count,
        stored_event_count: state.recent_events.len(),
        windows,
        top_endpoints: top_endpoints(state, top_n),
        skipped_events,
    }
}
