//! Response encoding
//!
//! Each endpoint accepts a closed set of interchangeable wire formats.
//! JSON goes through serde; the protobuf variants and pickle are produced
//! by the `wire` and `pickle` submodules.

pub mod pickle;
pub mod wire;

use crate::api::error::ApiError;
use crate::fetch::PointVector;
use crate::glob::GlobMatch;
use pickle::Value;
use serde::Serialize;

/// Wire formats a client can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Pickle,
    Protobuf,
    Protobuf3,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Format::Json),
            "pickle" => Some(Format::Pickle),
            "protobuf" => Some(Format::Protobuf),
            "protobuf3" => Some(Format::Protobuf3),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Pickle => "application/pickle",
            Format::Protobuf | Format::Protobuf3 => "application/protobuf",
        }
    }
}

/// Retention schema of one metric, as served by `/info/`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInfo {
    pub name: String,
    pub aggregation_method: String,
    pub max_retention: i32,
    pub x_files_factor: f32,
    pub retentions: Vec<InfoRetention>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoRetention {
    pub seconds_per_point: i32,
    pub number_of_points: i32,
}

#[derive(Serialize)]
struct ListBody<'a> {
    metrics: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchBody<'a> {
    path: &'a str,
    is_leaf: bool,
}

#[derive(Serialize)]
struct FindBody<'a> {
    name: &'a str,
    matches: Vec<MatchBody<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchBody<'a> {
    name: &'a str,
    start_time: i32,
    stop_time: i32,
    step_time: i32,
    values: &'a [f64],
    is_absent: &'a [bool],
}

#[derive(Serialize)]
struct RenderBody<'a> {
    metrics: Vec<FetchBody<'a>>,
}

fn json<T: Serialize>(body: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(|e| ApiError::Encode(e.to_string()))
}

fn unsupported(format: Format) -> ApiError {
    // Handlers gate the format set per endpoint before encoding.
    ApiError::Encode(format!("{format:?} not supported for this endpoint"))
}

/// `/metrics/list/` body: every known metric in dotted form.
pub fn list(metrics: &[String], format: Format) -> Result<Vec<u8>, ApiError> {
    match format {
        Format::Json => json(&ListBody { metrics }),
        Format::Protobuf | Format::Protobuf3 => Ok(wire::list_response(metrics)),
        Format::Pickle => Err(unsupported(format)),
    }
}

/// `/metrics/find/` body.
///
/// The pickle shape carries both the graphite 0.9.x key spelling
/// (`metric_path`/`isLeaf`) and the graphite-master one (`path`/`is_leaf`),
/// plus a single open-ended interval set.
pub fn find(
    name: &str,
    matches: &[GlobMatch],
    format: Format,
    now: i64,
) -> Result<Vec<u8>, ApiError> {
    match format {
        Format::Json => json(&FindBody {
            name,
            matches: matches
                .iter()
                .map(|m| MatchBody {
                    path: &m.path,
                    is_leaf: m.is_leaf,
                })
                .collect(),
        }),
        Format::Protobuf | Format::Protobuf3 => Ok(wire::glob_response(name, matches)),
        Format::Pickle => {
            let intervals = Value::Dict(vec![
                ("start", Value::Int(0)),
                ("end", Value::Int(now + 60)),
            ]);
            let items = matches
                .iter()
                .map(|m| {
                    Value::Dict(vec![
                        ("metric_path", Value::Str(m.path.clone())),
                        ("isLeaf", Value::Bool(m.is_leaf)),
                        ("path", Value::Str(m.path.clone())),
                        ("is_leaf", Value::Bool(m.is_leaf)),
                        ("intervals", intervals.clone()),
                    ])
                })
                .collect();
            Ok(pickle::encode(&Value::List(items)))
        }
    }
}

/// `/render/` body: one entry per fetched leaf.
pub fn render(results: &[PointVector], format: Format) -> Result<Vec<u8>, ApiError> {
    match format {
        Format::Json => json(&RenderBody {
            metrics: results
                .iter()
                .map(|r| FetchBody {
                    name: &r.name,
                    start_time: r.start_time,
                    stop_time: r.stop_time,
                    step_time: r.step_time,
                    values: &r.values,
                    is_absent: &r.is_absent,
                })
                .collect(),
        }),
        Format::Protobuf => Ok(wire::multi_fetch_response(results, false)),
        Format::Protobuf3 => Ok(wire::multi_fetch_response(results, true)),
        Format::Pickle => {
            let items = results
                .iter()
                .map(|r| {
                    let values = r
                        .values
                        .iter()
                        .zip(&r.is_absent)
                        .map(|(v, absent)| {
                            if *absent {
                                Value::None
                            } else {
                                Value::Float(*v)
                            }
                        })
                        .collect();
                    Value::Dict(vec![
                        ("start", Value::Int(i64::from(r.start_time))),
                        ("step", Value::Int(i64::from(r.step_time))),
                        ("end", Value::Int(i64::from(r.stop_time))),
                        ("name", Value::Str(r.name.clone())),
                        ("values", Value::List(values)),
                    ])
                })
                .collect();
            Ok(pickle::encode(&Value::List(items)))
        }
    }
}

/// `/info/` body: the retention schema.
pub fn info(info: &MetricInfo, format: Format) -> Result<Vec<u8>, ApiError> {
    match format {
        Format::Json => json(info),
        Format::Protobuf | Format::Protobuf3 => Ok(wire::info_response(info)),
        Format::Pickle => Err(unsupported(format)),
    }
}
