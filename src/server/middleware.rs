//! Request metrics and access logging
//!
//! Counters are kept per route template (`/api/tts`, not the full URI), so
//! query strings carrying request text never become metric keys.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

/// Requests slower than this are logged as warnings
const SLOW_REQUEST_MS: u64 = 5000;

/// Key for requests that matched no route
const UNMATCHED: &str = "<unmatched>";

#[derive(Debug, Default)]
struct RouteCounters {
    requests: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl RouteCounters {
    fn record(&self, status: StatusCode, elapsed_ms: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if status.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(elapsed_ms, Ordering::Relaxed);
    }

    fn snapshot(&self, route: &str) -> RouteSummary {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        RouteSummary {
            route: route.to_string(),
            requests,
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            avg_ms: if requests > 0 { total_ms as f64 / requests as f64 } else { 0.0 },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Figures for one route
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub route: String,
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

/// HTTP figures reported by `/api/stats`
#[derive(Debug, Clone, Serialize)]
pub struct HttpSummary {
    pub requests: u64,
    /// Requests currently being served, this one included
    pub in_flight: usize,
    pub client_errors: u64,
    pub server_errors: u64,
    /// Sorted by route
    pub routes: Vec<RouteSummary>,
}

/// Lock-free request counters shared by every handler
#[derive(Debug)]
pub struct HttpMetrics {
    routes: DashMap<String, RouteCounters>,
    in_flight: AtomicUsize,
    access_log: bool,
}

impl HttpMetrics {
    pub fn new(access_log: bool) -> Self {
        Self {
            routes: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            access_log,
        }
    }

    pub fn record(&self, route: &str, status: StatusCode, elapsed_ms: u64) {
        if let Some(counters) = self.routes.get(route) {
            counters.record(status, elapsed_ms);
            return;
        }
        self.routes
            .entry(route.to_string())
            .or_default()
            .record(status, elapsed_ms);
    }

    pub fn summary(&self) -> HttpSummary {
        let mut routes: Vec<RouteSummary> = self
            .routes
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect();
        routes.sort_by(|a, b| a.route.cmp(&b.route));

        HttpSummary {
            requests: routes.iter().map(|r| r.requests).sum(),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            client_errors: routes.iter().map(|r| r.client_errors).sum(),
            server_errors: routes.iter().map(|r| r.server_errors).sum(),
            routes,
        }
    }
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Releases the in-flight slot even when the response future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Count and log every request
pub async fn track_requests(State(metrics): State<Arc<HttpMetrics>>, req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string());
    let method = req.method().clone();
    let started = Instant::now();

    let response = {
        let _slot = InFlight::enter(&metrics.in_flight);
        next.run(req).await
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status();
    metrics.record(&route, status, elapsed_ms);

    if metrics.access_log {
        if elapsed_ms > SLOW_REQUEST_MS {
            warn!(%method, %route, status = status.as_u16(), elapsed_ms, "slow request");
        } else {
            info!(%method, %route, status = status.as_u16(), elapsed_ms, "request");
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_route_counters() {
        let metrics = HttpMetrics::new(false);
        metrics.record("/api/tts", StatusCode::OK, 100);
        metrics.record("/api/tts", StatusCode::BAD_REQUEST, 10);
        metrics.record("/health", StatusCode::SERVICE_UNAVAILABLE, 2);

        let summary = metrics.summary();
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.client_errors, 1);
        assert_eq!(summary.server_errors, 1);
        assert_eq!(summary.in_flight, 0);

        let tts = &summary.routes[0];
        assert_eq!(tts.route, "/api/tts");
        assert_eq!(tts.avg_ms, 55.0);
        assert_eq!(tts.max_ms, 100);
        assert_eq!(summary.routes[1].route, "/health");
    }

    #[test]
    fn test_in_flight_released() {
        let metrics = HttpMetrics::default();
        {
            let _slot = InFlight::enter(&metrics.in_flight);
            assert_eq!(metrics.summary().in_flight, 1);
        }
        assert_eq!(metrics.summary().in_flight, 0);
    }

    #[test]
    fn test_empty() {
        let summary = HttpMetrics::default().summary();
        assert_eq!(summary.requests, 0);
        assert!(summary.routes.is_empty());
    }
}
