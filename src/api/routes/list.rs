//! Full metric listing
//!
//! - `GET /metrics/list/?format=json`

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::api::encode::{self, Format};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::index::Snapshot;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub format: String,
}

/// List every metric the index knows, in dotted form.
///
/// Requires a published snapshot; before the first walk completes (or with
/// the builder disabled) this fails with a 500.
pub async fn list_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Response> {
    let start = Instant::now();
    state.stats.list_requests.inc();

    let format = match Format::parse(&params.format) {
        Some(Format::Pickle) | None => {
            state.stats.list_errors.inc();
            return Err(ApiError::BadRequest("unsupported format".to_string()));
        }
        Some(f) => f,
    };

    let snapshot = state.index.current().ok_or_else(|| {
        state.stats.list_errors.inc();
        ApiError::IndexUnavailable
    })?;

    let metrics = metric_names(&snapshot);
    let body = encode::list(&metrics, format).map_err(|e| {
        state.stats.list_errors.inc();
        e
    })?;

    tracing::debug!(metrics = metrics.len(), runtime = ?start.elapsed(), "list served");
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

/// Dotted names of all `.wsp` paths in a snapshot.
fn metric_names(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .paths()
        .iter()
        .filter_map(|p| p.strip_suffix(".wsp"))
        .map(|p| p.trim_start_matches('/').replace('/', "."))
        .collect()
}
