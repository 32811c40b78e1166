/// API Helpers
///
/// Error mapping from core error kinds to HTTP responses, plus the
/// parsers for the two structured register-key syntaxes.

use axum::http::StatusCode;
use axum::Json;

use super::types::ApiError;
use crate::error::ArchiveError;
use crate::registers::SEP;
use crate::types::{Identifier, RegisterId};

/// The single supported path-encoding version for /values requests.
pub const SUPPORTED_KEY_VERSION: u8 = 1;

pub fn not_found(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::NOT_FOUND, Json(ApiError::new(message)))
}

pub fn unavailable(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiError::new(message)),
    )
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError::new(message)))
}

pub fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(message)),
    )
}

/// Map a core error to its HTTP shape. NotFound and Unavailable are
/// expected outcomes, not server faults.
pub fn archive_error(err: ArchiveError) -> (StatusCode, Json<ApiError>) {
    match err {
        ArchiveError::NotFound(_) => not_found(err.to_string()),
        ArchiveError::Unavailable(_) => unavailable(err.to_string()),
        ArchiveError::InvalidArgument(_) => bad_request(err.to_string()),
        other => internal_error(other.to_string()),
    }
}

/// Parse a 64-character hex identifier path segment.
pub fn parse_identifier(raw: &str) -> Result<Identifier, (StatusCode, Json<ApiError>)> {
    Identifier::from_hex(raw)
        .map_err(|_| bad_request(format!("invalid identifier: {}", raw)))
}

/// Decode a /registers/{keyHex} path segment: hex of
/// `owner SEP key`, split at the first separator byte. Owners never
/// contain the separator, so the split is unambiguous.
pub fn parse_register_key(raw: &str) -> Result<RegisterId, (StatusCode, Json<ApiError>)> {
    let bytes =
        hex::decode(raw).map_err(|_| bad_request(format!("invalid register key hex: {}", raw)))?;
    let split = bytes
        .iter()
        .position(|&b| b == SEP)
        .ok_or_else(|| bad_request("register key missing separator"))?;
    Ok(RegisterId::new(
        bytes[..split].to_vec(),
        bytes[split + 1..].to_vec(),
    ))
}

/// Parse the /values/{keys} syntax: keys joined by ':', parts within
/// a key joined by ',', each part `<typeDec>.<valueHex>`. Part type 0
/// is the owner, type 2 the key; a key part is required, the owner
/// defaults to empty ("global" register).
pub fn parse_ledger_keys(raw: &str) -> Result<Vec<RegisterId>, (StatusCode, Json<ApiError>)> {
    let mut registers = Vec::new();
    for key_text in raw.split(':') {
        let mut owner: Option<Vec<u8>> = None;
        let mut key: Option<Vec<u8>> = None;
        for part in key_text.split(',') {
            let (type_text, value_hex) = part
                .split_once('.')
                .ok_or_else(|| bad_request(format!("malformed key part: {}", part)))?;
            let part_type: u8 = type_text
                .parse()
                .map_err(|_| bad_request(format!("bad key part type: {}", type_text)))?;
            let value = hex::decode(value_hex)
                .map_err(|_| bad_request(format!("bad key part hex: {}", value_hex)))?;
            match part_type {
                0 => owner = Some(value),
                2 => key = Some(value),
                other => {
                    return Err(bad_request(format!("unsupported key part type: {}", other)))
                }
            }
        }
        let key = key.ok_or_else(|| bad_request(format!("key part missing in: {}", key_text)))?;
        registers.push(RegisterId::new(owner.unwrap_or_default(), key));
    }
    Ok(registers)
}
