/// Entity Lookup Endpoints
///
/// Transactions, collections, guarantees, seals and execution results
/// by id, plus the per-height id listings.

use std::sync::Arc;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use super::helpers::{archive_error, parse_identifier};
use super::types::{ApiError, HeightResponse, IdListResponse};
use crate::index_reader::IndexReader;
use crate::ops::ReaderOps;
use crate::types::{Collection, ExecutionResult, Guarantee, Seal, Transaction};

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub script: String,
    pub arguments: Vec<String>,
    pub reference_block_id: String,
    pub gas_limit: u64,
    pub payer: String,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            script: hex::encode(tx.script),
            arguments: tx.arguments.iter().map(hex::encode).collect(),
            reference_block_id: tx.reference_block_id.to_string(),
            gas_limit: tx.gas_limit,
            payer: hex::encode(tx.payer),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub id: String,
    pub transaction_ids: Vec<String>,
}

impl From<Collection> for CollectionResponse {
    fn from(collection: Collection) -> Self {
        Self {
            id: collection.id.to_string(),
            transaction_ids: collection
                .transaction_ids
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GuaranteeResponse {
    pub collection_id: String,
    pub reference_block_id: String,
}

impl From<Guarantee> for GuaranteeResponse {
    fn from(guarantee: Guarantee) -> Self {
        Self {
            collection_id: guarantee.collection_id.to_string(),
            reference_block_id: guarantee.reference_block_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SealResponse {
    pub id: String,
    pub block_id: String,
    pub result_id: String,
    pub final_state: String,
}

impl From<Seal> for SealResponse {
    fn from(seal: Seal) -> Self {
        Self {
            id: seal.id.to_string(),
            block_id: seal.block_id.to_string(),
            result_id: seal.result_id.to_string(),
            final_state: seal.final_state.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub id: String,
    pub block_id: String,
    pub previous_result_id: String,
}

impl From<ExecutionResult> for ResultResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            id: result.id.to_string(),
            block_id: result.block_id.to_string(),
            previous_result_id: result.previous_result_id.to_string(),
        }
    }
}

/// GET /api/v1/transaction/{idHex}
pub async fn transaction_v1(
    Path(id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<TransactionResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&id)?;
    let tx = reader.transaction(&id).map_err(archive_error)?;
    Ok(Json(tx.into()))
}

/// GET /api/v1/transaction/{idHex}/height
pub async fn transaction_height_v1(
    Path(id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<HeightResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&id)?;
    let height = reader.height_for_transaction(&id).map_err(archive_error)?;
    Ok(Json(HeightResponse { height }))
}

/// GET /api/v1/collection/{idHex}
pub async fn collection_v1(
    Path(id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<CollectionResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&id)?;
    let collection = reader.collection(&id).map_err(archive_error)?;
    Ok(Json(collection.into()))
}

/// GET /api/v1/guarantee/{idHex}
pub async fn guarantee_v1(
    Path(id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<GuaranteeResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&id)?;
    let guarantee = reader.guarantee(&id).map_err(archive_error)?;
    Ok(Json(guarantee.into()))
}

/// GET /api/v1/seal/{idHex}
pub async fn seal_v1(
    Path(id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<SealResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&id)?;
    let seal = reader.seal(&id).map_err(archive_error)?;
    Ok(Json(seal.into()))
}

/// GET /api/v1/result/{idHex}
pub async fn result_v1(
    Path(id): Path<String>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<ResultResponse>, (StatusCode, Json<ApiError>)> {
    let id = parse_identifier(&id)?;
    let result = reader.result(&id).map_err(archive_error)?;
    Ok(Json(result.into()))
}

fn id_list(
    height: u64,
    ids: Vec<crate::types::Identifier>,
) -> Json<IdListResponse> {
    Json(IdListResponse {
        height,
        ids: ids.iter().map(|id| id.to_string()).collect(),
    })
}

/// GET /api/v1/collections/{height}
pub async fn collections_at_v1(
    Path(height): Path<u64>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<IdListResponse>, (StatusCode, Json<ApiError>)> {
    let ids = reader.collections_by_height(height).map_err(archive_error)?;
    Ok(id_list(height, ids))
}

/// GET /api/v1/transactions/{height}
pub async fn transactions_at_v1(
    Path(height): Path<u64>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<IdListResponse>, (StatusCode, Json<ApiError>)> {
    let ids = reader
        .transactions_by_height(height)
        .map_err(archive_error)?;
    Ok(id_list(height, ids))
}

/// GET /api/v1/seals/{height}
pub async fn seals_at_v1(
    Path(height): Path<u64>,
    Extension(reader): Extension<Arc<IndexReader>>,
) -> Result<Json<IdListResponse>, (StatusCode, Json<ApiError>)> {
    let ids = reader.seals_by_height(height).map_err(archive_error)?;
    Ok(id_list(height, ids))
}
