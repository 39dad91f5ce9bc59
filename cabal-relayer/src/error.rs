//! Relay errors and their HTTP rendering.

use axum::{http::StatusCode, response::IntoResponse, Json};
use cabal_common::{CabalError, DecodedRevert};
use ethers::types::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Request(#[from] CabalError),

    #[error("Unsupported Chain ID")]
    UnsupportedChain(u64),

    #[error("chainId {body} in body does not match chainId {path} in path")]
    ChainMismatch { path: u64, body: u64 },

    /// The call reverted during simulation or submission.
    #[error("{}", revert_label(.revert))]
    Reverted {
        revert: Option<DecodedRevert>,
        data: Bytes,
    },

    /// The node answered with a JSON-RPC error.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The node could not be reached or returned garbage.
    #[error("transport error: {0}")]
    Transport(String),
}

fn revert_label(revert: &Option<DecodedRevert>) -> String {
    match revert {
        Some(decoded) => decoded.name.clone(),
        None => "Execution reverted".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, code: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Request(err) => {
                let code = err.code();
                match &err {
                    CabalError::Schema(message) => ApiError::bad_request(message.clone(), code),
                    CabalError::Serialization(_) => ApiError::bad_request(err.to_string(), code),
                    CabalError::UnknownFunction(_) | CabalError::AmbiguousFunction(_) => {
                        ApiError::bad_request("Invalid function", code)
                            .with_details(serde_json::json!(err.to_string()))
                    }
                    CabalError::InvalidIntent { expected, got } => {
                        ApiError::bad_request("InvalidIntent", code).with_details(serde_json::json!({
                            "expected": expected.to_string(),
                            "got": got.to_string(),
                        }))
                    }
                    _ => ApiError::bad_request("Invalid request", code)
                        .with_details(serde_json::json!(err.to_string())),
                }
            }
            RelayError::UnsupportedChain(chain_id) => {
                ApiError::bad_request("Unsupported Chain ID", "UNSUPPORTED_CHAIN")
                    .with_details(serde_json::json!({ "chainId": chain_id }))
            }
            err @ RelayError::ChainMismatch { .. } => {
                ApiError::bad_request(err.to_string(), "CHAIN_MISMATCH")
            }
            RelayError::Reverted { revert, data } => {
                let message = revert_label(&revert);
                ApiError::bad_request(message, "REVERTED").with_details(serde_json::json!({
                    "revert": revert.as_ref().map(DecodedRevert::to_json),
                    "data": data,
                }))
            }
            RelayError::Rpc(message) => ApiError::bad_request(message, "RPC_ERROR"),
            err @ RelayError::Transport(_) => Self {
                status: StatusCode::BAD_GATEWAY,
                message: err.to_string(),
                code: "UPSTREAM_UNAVAILABLE".into(),
                details: None,
            },
        }
    }
}

impl From<CabalError> for ApiError {
    fn from(err: CabalError) -> Self {
        RelayError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut body = serde_json::json!({
            "error": self.message,
            "error_code": self.code,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabal_common::revert::{decode_revert, encode_revert};
    use ethers::types::U256;

    #[test]
    fn maps_request_errors() {
        let err: ApiError = CabalError::InvalidAddress("0x12".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid request");

        let err: ApiError = CabalError::UnknownFunction("0xdeadbeef".into()).into();
        assert_eq!(err.message, "Invalid function");
        assert_eq!(err.code, "INVALID_FUNCTION");

        let err: ApiError = CabalError::Schema("missing field `target`".into()).into();
        assert_eq!(err.message, "missing field `target`");
        assert_eq!(err.code, "INVALID_SCHEMA");

        let err: ApiError = CabalError::InvalidIntent {
            expected: U256::from(1),
            got: U256::from(2),
        }
        .into();
        assert_eq!(err.message, "InvalidIntent");
        assert_eq!(err.details.unwrap()["got"], "2");
    }

    #[test]
    fn reverts_carry_decoded_name() {
        let data = encode_revert("InvalidProof()", &[]);
        let err: ApiError = RelayError::Reverted {
            revert: decode_revert(&data),
            data: Bytes::from(data),
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "InvalidProof");
        assert_eq!(err.details.unwrap()["revert"]["name"], "InvalidProof");
    }

    #[test]
    fn undecodable_revert_is_generic() {
        let err: ApiError = RelayError::Reverted {
            revert: None,
            data: Bytes::new(),
        }
        .into();
        assert_eq!(err.message, "Execution reverted");
    }

    #[test]
    fn transport_errors_are_bad_gateway() {
        let err: ApiError = RelayError::Transport("connection refused".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "UPSTREAM_UNAVAILABLE");
    }
}
