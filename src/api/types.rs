/// API Response Types
///
/// JSON shapes served by the REST surface. Identifiers, commitments
/// and register values travel as hex strings; heights as plain
/// numbers.

use serde::{Deserialize, Serialize};

use crate::types::{Event, Header, Height};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeightResponse {
    pub height: Height,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub first: Option<Height>,
    pub last: Option<Height>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeaderResponse {
    pub chain_id: String,
    pub block_id: String,
    pub parent_id: String,
    pub height: Height,
    pub timestamp: u64,
}

impl From<Header> for HeaderResponse {
    fn from(header: Header) -> Self {
        Self {
            chain_id: header.chain_id,
            block_id: header.block_id.to_string(),
            parent_id: header.parent_id.to_string(),
            height: header.height,
            timestamp: header.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub height: Height,
    pub commit: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub transaction_id: String,
    pub event_index: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            transaction_id: event.transaction_id.to_string(),
            event_index: event.event_index,
            kind: event.kind,
            payload: hex::encode(event.payload),
        }
    }
}

/// GET /registers/{keyHex} response: the key echoed back, the value
/// at the resolved height.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub height: Height,
    pub key: String,
    pub value: String,
}

/// GET /values/{keys} response: one hex value per requested key, in
/// request order.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValuesResponse {
    pub height: Height,
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdListResponse {
    pub height: Height,
    pub ids: Vec<String>,
}
