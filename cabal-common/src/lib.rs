//! cabal-common
//!
//! Types and utilities shared by the Cabal relayer and deployment tooling.
//! A Cabal is a shared smart-contract wallet whose members authorize actions
//! with Semaphore group-membership proofs instead of signatures. This crate
//! holds everything the off-chain side needs to talk to those contracts:
//! the embedded ABIs and selector dispatch, request DTOs and their
//! validation, proof payloads, intent binding, revert decoding and CREATE2
//! helpers. Proof generation and verification happen elsewhere.

use ethers_core::types::U256;
use thiserror::Error;

pub mod abi;
pub mod args;
pub mod chains;
pub mod create2;
pub mod intent;
pub mod proof;
pub mod request;
pub mod revert;
pub mod units;

pub use abi::{AbiRegistry, CallDescriptor, ContractKind, Selector, RELAYABLE_FUNCTIONS};
pub use chains::{ChainConfig, ChainInfo};
pub use intent::Intent;
pub use proof::{ProofPayload, SemaphoreProof};
pub use request::{LegacyExecuteRequest, RelayCall, TxRequest};
pub use revert::DecodedRevert;

/// Relayers below this balance (0.0015 ether) report themselves as not ready.
pub const MIN_RELAYER_BALANCE_WEI: u128 = 1_500_000_000_000_000;

/// Number of curve coordinates in a packed Semaphore proof.
pub const PROOF_POINTS: usize = 8;

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CabalError {
    /// Body did not match the request schema.
    #[error("invalid request: {0}")]
    Schema(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("invalid function: {0}")]
    UnknownFunction(String),

    #[error("ambiguous function: {0}")]
    AmbiguousFunction(String),

    /// The proof's message is bound to a different action than the one requested.
    #[error("InvalidIntent: proof message {got} does not match expected {expected}")]
    InvalidIntent { expected: U256, got: U256 },

    #[error("invalid vanity prefix: {0}")]
    InvalidPrefix(String),

    #[error("abi error: {0}")]
    Abi(#[from] ethers_core::abi::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CabalError {
    /// Stable machine-readable code for HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CabalError::Schema(_) => "INVALID_SCHEMA",
            CabalError::InvalidAddress(_)
            | CabalError::InvalidNumber(_)
            | CabalError::InvalidHex(_)
            | CabalError::InvalidArgument { .. }
            | CabalError::ArgumentCount { .. } => "INVALID_REQUEST",
            CabalError::UnknownFunction(_) | CabalError::AmbiguousFunction(_) => {
                "INVALID_FUNCTION"
            }
            CabalError::InvalidIntent { .. } => "INVALID_INTENT",
            CabalError::InvalidPrefix(_) => "INVALID_PREFIX",
            CabalError::Abi(_) => "ABI_ERROR",
            CabalError::Serialization(_) => "INVALID_SCHEMA",
        }
    }
}

pub type Result<T, E = CabalError> = std::result::Result<T, E>;
