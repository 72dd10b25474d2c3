//! Windowed point fetch
//!
//! - `GET /render/?target=the.metric.name&format=json&from=1396008021&until=1396022421`

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::api::encode::{self, Format};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderParams {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub until: String,
}

/// Fetch every leaf matching `target` over `[from, until]`.
///
/// Per-metric failures are absorbed: the response carries whatever leaves
/// could be read.
pub async fn render_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RenderParams>,
) -> ApiResult<Response> {
    let start = Instant::now();
    state.stats.render_requests.inc();

    let format = match Format::parse(&params.format) {
        Some(f) => f,
        None => {
            state.stats.render_errors.inc();
            return Err(ApiError::BadRequest("unsupported format".to_string()));
        }
    };

    let from = params.from.parse::<i32>();
    let until = params.until.parse::<i32>();
    let (from, until) = match (from, until) {
        (Ok(from), Ok(until)) => (from, until),
        _ => {
            state.stats.render_errors.inc();
            return Err(ApiError::BadRequest("invalid from/until time".to_string()));
        }
    };

    let snapshot = state.index.current();
    let fetcher = Arc::clone(&state.fetcher);
    let expander = state.expander.clone();
    let target = params.target.clone();
    let results = tokio::task::spawn_blocking(move || {
        fetcher.fetch_multi(&expander, snapshot.as_deref(), &target, from, until)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let values_fetched: usize = results.iter().map(|r| r.values.len()).sum();

    let body = encode::render(&results, format).map_err(|e| {
        state.stats.render_errors.inc();
        e
    })?;
    state.stats.fetch_size_bytes.add(body.len() as u64);

    tracing::info!(
        target = %params.target,
        metrics_fetched = results.len(),
        values_fetched,
        body_bytes = body.len(),
        from,
        until,
        format = %params.format,
        runtime = ?start.elapsed(),
        "fetch served"
    );
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}
