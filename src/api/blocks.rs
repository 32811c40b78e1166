/// Block-Level Endpoints
///
/// Boundary markers, headers, commits and the block-id lookup. All
/// block data is immutable once indexed.

use std::sync::Arc;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};

use super::helpers::{archive_error, parse_identifier};
use super::types::{ApiError, CommitResponse, HeaderResponse, HeightResponse, StatusResponse};
use crate::index_reader::IndexReader;
use crate::metrics;
use crate::ops::ReaderOps;

/// GET /api/v1/first
pub async fn first_v1(
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<HeightResponse>, (StatusCode, Json<ApiError>)> {
    let height = reader.first().map_err(archive_error)?;
    Ok(Json(HeightResponse { height }))
}

/// GET /api/v1/last
pub async fn last_v1(
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<HeightResponse>, (StatusCode, Json<ApiError>)> {
    let height = reader.last().map_err(archive_error)?;
    Ok(Json(HeightResponse { height }))
}

/// GET /api/v1/header/{height}
pub async fn header_v1(
    Path(height): Path<u64>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<HeaderResponse>, (StatusCode, Json<ApiError>)> {
    let header = reader.header(height).map_err(archive_error)?;
    Ok(Json(header.into()))
}

/// GET /api/v1/commit/{height}
pub async fn commit_v1(
    Path(height): Path<u64>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<CommitResponse>, (StatusCode, Json<ApiError>)> {
    let commit = reader.commit(height).map_err(archive_error)?;
    Ok(Json(CommitResponse {
        height,
        commit: commit.to_string(),
    }))
}

/// GET /api/v1/block/{blockIdHex}/height
pub async fn block_height_v1(
    Path(block_id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<HeightResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&block_id)?;
    let height = reader.height_for_block(&id).map_err(archive_error)?;
    Ok(Json(HeightResponse { height }))
}

/// GET /api/v1/status
///
/// Always answers, even before the first height lands.
pub async fn status_v1(
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        first: reader.first().ok(),
        last: reader.last().ok(),
    })
}

/// GET /metrics
pub async fn metrics_v1() -> String {
    metrics::gather()
}
