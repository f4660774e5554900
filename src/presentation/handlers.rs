// HTTP request handlers
use crate::application::chart_session::{ChartHandle, NearestQuery};
use crate::application::render_state::NearestHit;
use crate::domain::coordinates::Viewport;
use crate::domain::time_series::Timestamp;
use crate::infrastructure::chunked_json::stream_snapshots;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Response, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ViewportQuery {
    pub from: Timestamp,
    pub to: Timestamp,
    pub width: f64,
    pub height: f64,
}

impl ViewportQuery {
    fn viewport(&self) -> Result<Viewport, StatusCode> {
        let viewport = Viewport::new(self.from, self.to, self.width, self.height);
        if viewport.is_valid() {
            Ok(viewport)
        } else {
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NearestParams {
    pub from: Timestamp,
    pub to: Timestamp,
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
    pub radius: Option<f64>,
    /// Comma-separated series ids; all series when absent.
    pub series: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NearestResponse {
    pub series_id: String,
    pub path: String,
    pub unit: String,
    pub t: Timestamp,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub label: String,
    pub distance_px: f64,
}

impl From<NearestHit> for NearestResponse {
    fn from(hit: NearestHit) -> Self {
        Self {
            label: time_label(hit.point.t, hit.aggregated),
            series_id: hit.series.id,
            path: hit.series.path,
            unit: hit.series.unit,
            t: hit.point.t,
            value: hit.point.v,
            min: hit.point.minv,
            max: hit.point.maxv,
            distance_px: hit.distance_px,
        }
    }
}

/// Aggregated points stand for a bucket, so they are labelled by day.
pub fn time_label(t: Timestamp, aggregated: bool) -> String {
    let format = if aggregated { "%Y-%m-%d" } else { "%Y-%m-%d %H:%M:%S" };
    chrono::DateTime::from_timestamp(t, 0)
        .map(|time| time.format(format).to_string())
        .unwrap_or_else(|| t.to_string())
}

fn session<'a>(state: &'a AppState, id: &str) -> Result<&'a ChartHandle, StatusCode> {
    state.registry.session(id).ok_or_else(|| {
        tracing::debug!(chart = %id, "Unknown chart");
        StatusCode::NOT_FOUND
    })
}

fn respond(result: Result<Response<Body>, StatusCode>) -> Response<Body> {
    match result {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List configured charts and their series
pub async fn list_charts(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond(json_response(&state.registry.charts(), accepts_brotli(&headers)).await)
}

/// Apply a viewport and return the render state right after the coverage check
pub async fn chart_state(
    Path(id): Path<String>,
    Query(query): Query<ViewportQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = async {
        let handle = session(&state, &id)?;
        let viewport = query.viewport()?;
        let snapshot = handle.set_viewport(viewport).await.map_err(|e| {
            tracing::warn!(chart = %id, "{}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;
        json_response(&*snapshot, accepts_brotli(&headers)).await
    }
    .await;
    respond(result)
}

/// Stream render state snapshots (progressive loading)
pub async fn stream_chart(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match session(&state, &id) {
        Ok(handle) => stream_snapshots(handle.subscribe(), accepts_brotli(&headers)).into_response(),
        Err(status) => status.into_response(),
    }
}

/// Tooltip lookup; `null` when nothing is within the radius
pub async fn nearest_point(
    Path(id): Path<String>,
    Query(params): Query<NearestParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = async {
        let handle = session(&state, &id)?;
        let viewport = ViewportQuery {
            from: params.from,
            to: params.to,
            width: params.width,
            height: params.height,
        }
        .viewport()?;

        let query = NearestQuery {
            viewport,
            x: params.x,
            y: params.y,
            radius_px: params.radius.unwrap_or(state.pointer_radius_px),
            visible: params
                .series
                .as_deref()
                .map(|ids| ids.split(',').map(str::to_string).collect()),
        };
        let hit = handle.nearest(query).await.map_err(|e| {
            tracing::warn!(chart = %id, "{}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

        json_response(&hit.map(NearestResponse::from), accepts_brotli(&headers)).await
    }
    .await;
    respond(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::live_updates::manual::ManualNotifier;
    use crate::application::live_updates::{LiveUpdateNotifier, DEFAULT_POLL_INTERVAL};
    use crate::application::session_registry::{ChartDefinition, SessionRegistry};
    use crate::application::values_repository::mock::MockValuesRepository;
    use crate::domain::aggregation::AggregationPolicy;
    use crate::domain::time_series::ChartSeries;

    fn state() -> Arc<AppState> {
        let chart = ChartDefinition {
            id: "engine".to_string(),
            title: "Engine".to_string(),
            series: vec![ChartSeries::new("rpm".into(), "engine.rpm".into(), "Hz".into(), 0)],
        };
        Arc::new(AppState {
            registry: SessionRegistry::start(
                vec![chart],
                AggregationPolicy::default(),
                Arc::new(MockValuesRepository::new()),
                LiveUpdateNotifier::new(Arc::new(ManualNotifier::new()), DEFAULT_POLL_INTERVAL),
            ),
            pointer_radius_px: 10.0,
        })
    }

    fn viewport_query(width: f64) -> ViewportQuery {
        ViewportQuery {
            from: 0,
            to: 1000,
            width,
            height: 100.0,
        }
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_time_labels() {
        assert_eq!(time_label(86_400 + 3661, false), "1970-01-02 01:01:01");
        assert_eq!(time_label(86_400 + 3661, true), "1970-01-02");
    }

    #[tokio::test]
    async fn test_unknown_chart_is_not_found() {
        let response = chart_state(
            Path("missing".to_string()),
            Query(viewport_query(500.0)),
            HeaderMap::new(),
            State(state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_viewport_is_bad_request() {
        let response = chart_state(
            Path("engine".to_string()),
            Query(viewport_query(0.0)),
            HeaderMap::new(),
            State(state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_state_reports_fetch_in_progress() {
        let response = chart_state(
            Path("engine".to_string()),
            Query(viewport_query(500.0)),
            HeaderMap::new(),
            State(state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["fetching"], true);
        assert_eq!(json["aggregationLevel"], -1);
        assert_eq!(json["lastError"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_nearest_after_data_arrives() {
        let state = state();
        let handle = state.registry.session("engine").unwrap().clone();
        let mut snapshots = handle.subscribe();
        handle.set_viewport(Viewport::new(0, 1000, 1000.0, 100.0)).await.unwrap();
        snapshots.wait_for(|s| !s.fetching).await.unwrap();

        let params = NearestParams {
            from: 0,
            to: 1000,
            width: 1000.0,
            height: 100.0,
            x: 500.0,
            y: 50.0,
            radius: None,
            series: Some("rpm".to_string()),
        };
        let response = nearest_point(
            Path("engine".to_string()),
            Query(params),
            HeaderMap::new(),
            State(state),
        )
        .await
        .into_response();

        let json = body_json(response).await;
        assert_eq!(json["seriesId"], "rpm");
        assert_eq!(json["t"], 500);
        assert_eq!(json["label"], "1970-01-01 00:08:20");
        assert!(json.get("min").is_none());
    }

    #[tokio::test]
    async fn test_list_charts() {
        let response = list_charts(HeaderMap::new(), State(state())).await.into_response();
        let json = body_json(response).await;
        assert_eq!(json[0]["id"], "engine");
        assert_eq!(json[0]["series"][0]["path"], "engine.rpm");
    }
}
