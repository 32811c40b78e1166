/// Query Server
///
/// Serves the reader contract over HTTP. Reads proceed concurrently
/// with the mapper's writes; the underlying stores give
/// snapshot-consistent point reads, so a response reflects either the
/// most recently committed height or a later one, never a partial
/// height.

use std::sync::Arc;
use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::{
    block_height_v1, collection_v1, collections_at_v1, commit_v1, events_v1, first_v1,
    guarantee_v1, header_v1, last_v1, metrics_v1, register_v1, result_v1, seal_v1, seals_at_v1,
    status_v1, transaction_height_v1, transaction_v1, transactions_at_v1, values_v1,
};
use crate::index_reader::IndexReader;

pub fn router(reader: Arc<IndexReader>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/registers/{key}", get(register_v1))
        .route("/values/{keys}", get(values_v1))
        .route("/api/v1/first", get(first_v1))
        .route("/api/v1/last", get(last_v1))
        .route("/api/v1/header/{height}", get(header_v1))
        .route("/api/v1/commit/{height}", get(commit_v1))
        .route("/api/v1/events/{height}", get(events_v1))
        .route("/api/v1/block/{id}/height", get(block_height_v1))
        .route("/api/v1/transaction/{id}", get(transaction_v1))
        .route("/api/v1/transaction/{id}/height", get(transaction_height_v1))
        .route("/api/v1/collection/{id}", get(collection_v1))
        .route("/api/v1/guarantee/{id}", get(guarantee_v1))
        .route("/api/v1/seal/{id}", get(seal_v1))
        .route("/api/v1/result/{id}", get(result_v1))
        .route("/api/v1/collections/{height}", get(collections_at_v1))
        .route("/api/v1/transactions/{height}", get(transactions_at_v1))
        .route("/api/v1/seals/{height}", get(seals_at_v1))
        .route("/api/v1/status", get(status_v1))
        .route("/metrics", get(metrics_v1))
        .layer(cors)
        .layer(axum::extract::Extension(reader))
}

/// Bind and serve until the cancellation token fires.
pub async fn serve(
    bind: &str,
    reader: Arc<IndexReader>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = bind, "query server listening");

    let app = router(reader);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}
