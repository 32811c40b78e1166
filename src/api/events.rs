/// Event Query Endpoint
///
/// Events at one height, optionally filtered by type. Types go
/// through the 64-bit bucket hash on the way in and an exact string
/// comparison on the way out, so hash collisions never leak foreign
/// events.

use std::sync::Arc;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::helpers::archive_error;
use super::types::{ApiError, EventResponse};
use crate::index_reader::IndexReader;
use crate::ops::ReaderOps;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    /// Comma-separated list of event types; absent means all types.
    #[serde(rename = "type")]
    pub kinds: Option<String>,
}

/// GET /api/v1/events/{height}?type=A.X,B.Y
pub async fn events_v1(
    Path(height): Path<u64>,
    Query(params): Query<EventsParams>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<Vec<EventResponse>>, (StatusCode, Json<ApiError>)> {
    let kinds: Vec<String> = params
        .kinds
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let events = reader.events(height, &kinds).map_err(archive_error)?;
    Ok(Json(events.into_iter().map(EventResponse::from).collect()))
}
