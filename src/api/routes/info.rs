//! Retention schema lookup
//!
//! - `GET /info/?target=the.metric.name&format=json`

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::encode::{self, Format, InfoRetention, MetricInfo};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::whisper::Whisper;

#[derive(Debug, Deserialize)]
pub struct InfoParams {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub format: String,
}

/// Report the archive layout of one metric's file.
pub async fn metric_info(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InfoParams>,
) -> ApiResult<Response> {
    state.stats.info_requests.inc();

    let format = if params.format.is_empty() {
        Format::Json
    } else {
        match Format::parse(&params.format) {
            Some(Format::Pickle) | None => {
                state.stats.info_errors.inc();
                return Err(ApiError::BadRequest("unsupported format".to_string()));
            }
            Some(f) => f,
        }
    };
    if params.target.is_empty() {
        state.stats.info_errors.inc();
        return Err(ApiError::BadRequest("no target".to_string()));
    }

    let path = state
        .data_root
        .join(format!("{}.wsp", params.target.replace('.', "/")));
    let target = params.target.clone();

    let info = tokio::task::spawn_blocking(move || -> Result<MetricInfo, crate::whisper::WhisperError> {
        let whisper = Whisper::open(&path)?;
        Ok(MetricInfo {
            name: target,
            aggregation_method: whisper.aggregation_method().to_string(),
            max_retention: whisper.max_retention() as i32,
            x_files_factor: whisper.x_files_factor(),
            retentions: whisper
                .retentions()
                .iter()
                .map(|r| InfoRetention {
                    seconds_per_point: r.seconds_per_point as i32,
                    number_of_points: r.points as i32,
                })
                .collect(),
        })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let info = match info {
        Ok(info) => info,
        Err(e) => {
            state.stats.notfound.inc();
            tracing::debug!(target = %params.target, error = %e, "info open error");
            return Err(ApiError::NotFound);
        }
    };

    let body = encode::info(&info, format).map_err(|e| {
        state.stats.info_errors.inc();
        e
    })?;

    tracing::debug!(target = %params.target, "info served");
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}
