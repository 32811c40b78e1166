/// Register Read Endpoints
///
/// The two ledger-facing endpoints: a single-register point read by
/// encoded key, and the batched /values read addressed by structured
/// ledger keys at a specific state commitment.

use std::sync::Arc;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::helpers::{
    archive_error, bad_request, parse_ledger_keys, parse_register_key, SUPPORTED_KEY_VERSION,
};
use super::types::{ApiError, RegisterResponse, ValuesResponse};
use crate::index_reader::IndexReader;
use crate::metrics;
use crate::ops::ReaderOps;
use crate::types::StateCommitment;

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    pub height: Option<u64>,
}

/// GET /registers/{keyHex}?height=H
///
/// Key is hex of `owner SEP key`. Height defaults to the last indexed
/// height. The value may legitimately be empty (tombstoned or never
/// written).
pub async fn register_v1(
    Path(key_hex): Path<String>,
    Query(params): Query<RegisterParams>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<RegisterResponse>, (StatusCode, Json<ApiError>)> {
    let timer = metrics::REGISTER_READ_SECONDS.start_timer();

    let register = parse_register_key(&key_hex)?;
    let height = match params.height {
        Some(height) => height,
        None => reader.last().map_err(archive_error)?,
    };

    let values = reader
        .values(height, std::slice::from_ref(&register))
        .map_err(archive_error)?;
    timer.observe_duration();

    Ok(Json(RegisterResponse {
        height,
        key: key_hex,
        value: hex::encode(&values[0]),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValuesParams {
    pub hash: String,
    pub version: Option<u8>,
}

/// GET /values/{keys}?hash=COMMIT&version=V
///
/// Keys use the structured ledger syntax (parts `<typeDec>.<hex>`
/// joined by ',', keys joined by ':'). The commitment hash resolves
/// to its height, then each key reads through the register store.
pub async fn values_v1(
    Path(keys): Path<String>,
    Query(params): Query<ValuesParams>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<ValuesResponse>, (StatusCode, Json<ApiError>)> {
    let version = params.version.unwrap_or(SUPPORTED_KEY_VERSION);
    if version != SUPPORTED_KEY_VERSION {
        return Err(bad_request(format!(
            "unsupported path encoding version {} (supported: {})",
            version, SUPPORTED_KEY_VERSION
        )));
    }

    let commit = StateCommitment::from_hex(&params.hash)
        .map_err(|_| bad_request(format!("invalid state commitment: {}", params.hash)))?;
    let registers = parse_ledger_keys(&keys)?;

    let height = reader.height_for_commit(&commit).map_err(archive_error)?;
    let values = reader.values(height, &registers).map_err(archive_error)?;

    Ok(Json(ValuesResponse {
        height,
        values: values.iter().map(hex::encode).collect(),
    }))
}
