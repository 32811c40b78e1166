// API Module
//
// REST surface over the reader contract. Each domain (registers,
// blocks, events, entities) lives in its own submodule; the router
// wiring is in `server.rs`.

pub mod types;
pub mod helpers;
pub mod registers;
pub mod blocks;
pub mod events;
pub mod transactions;

pub use registers::{register_v1, values_v1};
pub use blocks::{block_height_v1, commit_v1, first_v1, header_v1, last_v1, metrics_v1, status_v1};
pub use events::events_v1;
pub use transactions::{
    collection_v1, collections_at_v1, guarantee_v1, result_v1, seal_v1, seals_at_v1,
    transaction_height_v1, transaction_v1, transactions_at_v1,
};
