use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;

use crate::metrics::REGISTRY;
use crate::time_series::{MinuteRange, RequestTimeSeries};

/// Window served when `/statistics` is called without `ranges`: the current
/// minute plus the previous 59.
pub const DEFAULT_STATISTICS_RANGE: MinuteRange = MinuteRange::new(0, -59);

/// Query string of `/statistics`.
///
/// `ranges` is a comma separated list of `start:end` minute offsets with an
/// optional `/minutes` bucket width, for example `0:-59,-60:-1439/5`.
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub ranges: Option<String>,
}

/// Parse a `ranges` parameter. Malformed entries, including a zero bucket
/// width, are skipped.
pub fn parse_ranges(raw: &str) -> Vec<MinuteRange> {
    raw.split(',')
        .filter_map(|item| {
            let (window, aggregation) = match item.trim().split_once('/') {
                Some((window, width)) => (window, width.trim().parse::<u64>().ok()?),
                None => (item.trim(), 1),
            };
            if aggregation == 0 {
                return None;
            }
            let (start, end) = window.split_once(':')?;
            let start = start.trim().parse::<i64>().ok()?;
            let end = end.trim().parse::<i64>().ok()?;
            Some(MinuteRange::new(start, end).with_aggregation(aggregation))
        })
        .collect()
}

/// Handler for Prometheus metrics endpoint
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Handler for the request time series report
pub async fn statistics_handler(
    State(stats): State<Arc<RequestTimeSeries>>,
    Query(query): Query<StatisticsQuery>,
) -> Response {
    let mut ranges = query.ranges.as_deref().map(parse_ranges).unwrap_or_default();
    if ranges.is_empty() {
        ranges.push(DEFAULT_STATISTICS_RANGE);
    }
    Json(stats.serialize(&ranges)).into_response()
}

/// Administrative reset of the request time series
pub async fn reset_statistics_handler(State(stats): State<Arc<RequestTimeSeries>>) -> StatusCode {
    stats.reset();
    tracing::info!("Request time series reset");
    StatusCode::NO_CONTENT
}

/// Middleware that reports every completed response to the time series.
///
/// ```ignore
/// let app = Router::new()
///     .route("/blobs/:key", get(get_blob))
///     .layer(axum::middleware::from_fn_with_state(stats.clone(), track_requests));
/// ```
pub async fn track_requests(
    State(stats): State<Arc<RequestTimeSeries>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    stats.record_request(response.status().as_u16());
    response
}

/// Create metrics router
pub fn create_metrics_router(stats: Arc<RequestTimeSeries>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/statistics", get(statistics_handler))
        .route("/statistics/reset", post(reset_statistics_handler))
        .with_state(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::{Counter, TimeSeriesReport};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt; // for `oneshot`

    #[test]
    fn test_parse_ranges() {
        assert_eq!(
            parse_ranges("0:-59, -60:-1439"),
            vec![MinuteRange::new(0, -59), MinuteRange::new(-60, -1439)]
        );
    }

    #[test]
    fn test_parse_ranges_skips_malformed() {
        assert_eq!(
            parse_ranges("abc,1:x,:,-1:-1,5"),
            vec![MinuteRange::new(-1, -1)]
        );
        assert!(parse_ranges("").is_empty());
    }

    #[test]
    fn test_parse_ranges_with_bucket_width() {
        assert_eq!(
            parse_ranges("0:-59/5, -60:-1439"),
            vec![
                MinuteRange::new(0, -59).with_aggregation(5),
                MinuteRange::new(-60, -1439),
            ]
        );
        // Zero, negative and missing widths are malformed
        assert!(parse_ranges("0:-9/0,0:-9/-2,0:-9/").is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::metrics::init();

        let app = create_metrics_router(Arc::new(RequestTimeSeries::new()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn test_statistics_endpoint() {
        let stats = Arc::new(RequestTimeSeries::new());
        stats.record_request(200);
        stats.record_request(500);
        stats.rotate();

        let app = create_metrics_router(stats.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/statistics?ranges=-1:-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: TimeSeriesReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.requests.grand_total, 2);
        assert_eq!(report.requests.ranges[0].values, vec![2]);
        assert_eq!(report.errors.ranges[0].values, vec![1]);
    }

    #[tokio::test]
    async fn test_statistics_endpoint_buckets_minutes() {
        let stats = Arc::new(RequestTimeSeries::new());
        for _ in 0..3 {
            stats.record_request(200);
            stats.rotate();
        }

        let app = create_metrics_router(stats);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/statistics?ranges=-1:-3/2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: TimeSeriesReport = serde_json::from_slice(&body).unwrap();
        let series = &report.requests.ranges[0];
        assert_eq!(series.aggregation, 2);
        assert_eq!(series.values, vec![2, 1]);
        assert_eq!(series.sum, 3);
    }

    #[tokio::test]
    async fn test_statistics_defaults_to_last_hour() {
        let app = create_metrics_router(Arc::new(RequestTimeSeries::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/statistics?ranges=garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: TimeSeriesReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.requests.ranges.len(), 1);
        assert_eq!(report.requests.ranges[0].start, 0);
        assert_eq!(report.requests.ranges[0].end, -59);
    }

    #[tokio::test]
    async fn test_reset_endpoint() {
        let stats = Arc::new(RequestTimeSeries::new());
        stats.record_request(404);

        let app = create_metrics_router(stats.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/statistics/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(stats.grand_total(Counter::Request), 0);
        assert_eq!(stats.grand_total(Counter::NotFound), 0);
    }

    #[tokio::test]
    async fn test_track_requests_middleware() {
        let stats = Arc::new(RequestTimeSeries::new());
        let app = Router::new()
            .route("/ok", get(|| async { StatusCode::OK }))
            .route("/boom", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .layer(axum::middleware::from_fn_with_state(
                stats.clone(),
                track_requests,
            ));

        for uri in ["/ok", "/boom", "/missing"] {
            let _ = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
        }

        assert_eq!(stats.grand_total(Counter::Request), 3);
        assert_eq!(stats.grand_total(Counter::Error), 1);
        assert_eq!(stats.grand_total(Counter::NotFound), 1);
        assert_eq!(stats.grand_total(Counter::Warning), 0);
    }
}
