//! Metric discovery
//!
//! - `GET /metrics/find/?query=the.metric.*&format=json`

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
pub struct FindParams {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub format: String,
}

/// Expand a glob query into matching metrics and directories.
pub async fn find_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FindParams>,
) -> ApiResult<Response> {
    let start = Instant::now();
    state.stats.find_requests.inc();

    let format = match Format::parse(&params.format) {
        Some(f) => f,
        None => {
            state.stats.find_errors.inc();
            return Err(ApiError::BadRequest("unsupported format".to_string()));
        }
    };
    if params.query.is_empty() {
        state.stats.find_errors.inc();
        return Err(ApiError::BadRequest("no query".to_string()));
    }

    let snapshot = state.index.current();
    let expander = state.expander.clone();
    let query = params.query.clone();
    let matches =
        tokio::task::spawn_blocking(move || expander.expand(snapshot.as_deref(), &query))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

    let metrics_count = matches.iter().filter(|m| m.is_leaf).count() as u64;
    state.stats.metrics_found.add(metrics_count);
    if matches.is_empty() {
        // To get an idea how often we search for nothing.
        state.stats.find_zero.inc();
    }

    let now = chrono::Utc::now().timestamp();
    let body = encode::find(&params.query, &matches, format, now).map_err(|e| {
        state.stats.find_errors.inc();
        e
    })?;

    tracing::info!(
        query = %params.query,
        files = matches.len(),
        metrics_count,
        runtime = ?start.elapsed(),
        "find success"
    );
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}
