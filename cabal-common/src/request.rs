//! Relay request bodies and their validation.
//!
//! Validation runs in two steps. The schema step checks shapes (required
//! fields, `0x` prefixes, numeric chain id, string arguments) and fails with
//! [`CabalError::Schema`]. The formatting step parses addresses and numbers
//! and resolves the target function, producing a [`RelayCall`].

use ethers_core::abi::Token;
use ethers_core::types::{Address, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::abi::{CallDescriptor, ContractKind, RELAYABLE_FUNCTIONS};
use crate::args::{coerce_args, parse_address, parse_hex, token_to_json};
use crate::proof::{parse_decimal, ProofPayload, SemaphoreProof};
use crate::{CabalError, Result};

/// Canonical signature of the four-argument `Cabal.execute`.
pub const EXECUTE_SIGNATURE: &str =
    "execute(address,uint256,bytes,(uint256,uint256,uint256,uint256,uint256,uint256[8]))";

// ═══════════════════════════════════════════════════════════════════════════════
// GENERIC CALL REQUEST
// ═══════════════════════════════════════════════════════════════════════════════

/// `{ target, chainId, function, args }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub target: String,
    #[serde(deserialize_with = "coerce_chain_id")]
    pub chain_id: u64,
    pub function: String,
    pub args: Vec<String>,
}

impl TxRequest {
    /// Parse and schema-check a JSON body.
    pub fn from_json(value: Value) -> Result<Self> {
        let request: Self =
            serde_json::from_value(value).map_err(|e| CabalError::Schema(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.target.starts_with("0x") {
            return Err(CabalError::Schema("target must start with 0x".into()));
        }
        if self.function.trim().is_empty() {
            return Err(CabalError::Schema("function must not be empty".into()));
        }
        Ok(())
    }

    /// The checksum-validated target address.
    pub fn target_address(&self) -> Result<Address> {
        parse_address(&self.target)
    }

    /// Resolve the function and coerce the arguments.
    pub fn into_call(&self) -> Result<RelayCall> {
        let target = self.target_address()?;
        let descriptor = RELAYABLE_FUNCTIONS
            .resolve(&self.function, self.args.len())?
            .clone();
        let tokens = coerce_args(descriptor.inputs(), &self.args)?;
        Ok(RelayCall {
            target,
            chain_id: self.chain_id,
            descriptor,
            tokens,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEGACY EXECUTE REQUEST
// ═══════════════════════════════════════════════════════════════════════════════

/// `{ cabal, to, value, data, chainId, proof }`, always `Cabal.execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyExecuteRequest {
    #[serde(default)]
    pub cabal: Option<String>,
    pub to: String,
    pub value: String,
    pub data: String,
    #[serde(deserialize_with = "coerce_chain_id")]
    pub chain_id: u64,
    pub proof: ProofPayload,
}

impl LegacyExecuteRequest {
    pub fn from_json(value: Value) -> Result<Self> {
        let request: Self =
            serde_json::from_value(value).map_err(|e| CabalError::Schema(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(cabal) = &self.cabal {
            if !cabal.starts_with("0x") {
                return Err(CabalError::Schema("cabal must start with 0x".into()));
            }
        }
        if !self.to.starts_with("0x") {
            return Err(CabalError::Schema("to must start with 0x".into()));
        }
        if self.value.is_empty() || !self.value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CabalError::Schema("value must match ^[0-9]+$".into()));
        }
        if !self.data.starts_with("0x") {
            return Err(CabalError::Schema("data must start with 0x".into()));
        }
        self.proof.validate()
    }

    /// Build the `execute` call. `default_cabal` is used when the body
    /// carries no `cabal` address.
    pub fn into_call(&self, default_cabal: Option<Address>) -> Result<RelayCall> {
        let target = match &self.cabal {
            Some(cabal) => parse_address(cabal)?,
            None => default_cabal
                .ok_or_else(|| CabalError::Schema("cabal address is required".into()))?,
        };
        let to = parse_address(&self.to)?;
        let value = parse_decimal(&self.value)?;
        let data = parse_hex(&self.data).map_err(CabalError::InvalidHex)?;
        let proof = SemaphoreProof::try_from(&self.proof)?;

        let descriptor = ContractKind::Cabal
            .function(EXECUTE_SIGNATURE)
            .ok_or_else(|| CabalError::UnknownFunction(EXECUTE_SIGNATURE.into()))?;

        Ok(RelayCall {
            target,
            chain_id: self.chain_id,
            descriptor,
            tokens: vec![
                Token::Address(to),
                Token::Uint(value),
                Token::Bytes(data),
                proof.to_token(),
            ],
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVED CALL
// ═══════════════════════════════════════════════════════════════════════════════

/// A validated call ready for simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayCall {
    pub target: Address,
    pub chain_id: u64,
    pub descriptor: CallDescriptor,
    pub tokens: Vec<Token>,
}

impl RelayCall {
    pub fn calldata(&self) -> Result<Bytes> {
        let encoded = self.descriptor.function.encode_input(&self.tokens)?;
        Ok(Bytes::from(encoded))
    }

    /// The proof argument, if the function takes one.
    pub fn proof(&self) -> Option<SemaphoreProof> {
        self.descriptor
            .inputs()
            .iter()
            .zip(&self.tokens)
            .find(|(param, _)| SemaphoreProof::is_proof_type(&param.kind))
            .and_then(|(_, token)| SemaphoreProof::from_token(token))
    }

    /// Token for the named input.
    pub fn arg(&self, name: &str) -> Option<&Token> {
        self.descriptor
            .inputs()
            .iter()
            .position(|p| p.name == name)
            .and_then(|idx| self.tokens.get(idx))
    }

    /// Native value attached to the transaction. Relayed calls never carry
    /// value; the wallet pays out of its own balance.
    pub fn value(&self) -> U256 {
        U256::zero()
    }

    /// JSON summary of the call for responses and logs.
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "address": ethers_core::utils::to_checksum(&self.target, None),
            "contract": self.descriptor.contract.name(),
            "functionName": self.descriptor.name(),
            "selector": self.descriptor.selector_hex(),
            "args": self.tokens.iter().map(token_to_json).collect::<Vec<_>>(),
            "chainId": self.chain_id,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Accept a chain id as a JSON number or a numeric string.
fn coerce_chain_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("chainId must be a positive integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("chainId must be numeric, got {:?}", s))),
        other => Err(D::Error::custom(format!(
            "chainId must be a number, got {}",
            other
        ))),
    }
}

/// Parse a chain id from a path segment.
pub fn parse_chain_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| CabalError::Schema(format!("chainId must be numeric, got {:?}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_payload;
    use crate::intent::execute_message;
    use serde_json::json;

    const ACCOUNT_2: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const CABAL: &str = "0xcaba15de77BC1a93556347030D299995dFE777c6";

    #[test]
    fn tx_request_accepts_string_or_number_chain_id() {
        let numeric = TxRequest::from_json(json!({
            "target": CABAL,
            "chainId": 84532,
            "function": "createCabal",
            "args": ["1"]
        }))
        .unwrap();
        let string = TxRequest::from_json(json!({
            "target": CABAL,
            "chainId": "84532",
            "function": "createCabal",
            "args": ["1"]
        }))
        .unwrap();
        assert_eq!(numeric, string);
        assert_eq!(numeric.chain_id, 84532);
    }

    #[test]
    fn tx_request_schema_failures() {
        let cases = [
            json!({ "chainId": 1, "function": "0x12345678", "args": [] }),
            json!({ "target": "cabal", "chainId": 1, "function": "0x12345678", "args": [] }),
            json!({ "target": CABAL, "chainId": "base", "function": "0x12345678", "args": [] }),
            json!({ "target": CABAL, "chainId": 1, "function": "0x12345678", "args": [1] }),
            json!({ "target": CABAL, "chainId": 1, "function": "", "args": [] }),
        ];
        for body in cases {
            assert!(
                matches!(TxRequest::from_json(body.clone()), Err(CabalError::Schema(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn tx_request_into_call_by_selector() {
        let descriptor = RELAYABLE_FUNCTIONS.resolve("createCabal", 1).unwrap();
        let request = TxRequest::from_json(json!({
            "target": CABAL,
            "chainId": 84532,
            "function": descriptor.selector_hex(),
            "args": ["12345"]
        }))
        .unwrap();

        let call = request.into_call().unwrap();
        assert_eq!(call.descriptor.contract, ContractKind::CabalFactory);
        assert_eq!(call.tokens, vec![Token::Uint(U256::from(12345))]);
        assert_eq!(&call.calldata().unwrap()[..4], &descriptor.selector);
        assert!(call.proof().is_none());
    }

    #[test]
    fn tx_request_rejects_bad_target_and_unknown_function() {
        let bad_target = TxRequest::from_json(json!({
            "target": "0x1234",
            "chainId": 1,
            "function": "createCabal",
            "args": ["1"]
        }))
        .unwrap();
        assert!(matches!(
            bad_target.into_call(),
            Err(CabalError::InvalidAddress(_))
        ));

        let unknown = TxRequest::from_json(json!({
            "target": CABAL,
            "chainId": 1,
            "function": "0xdeadbeef",
            "args": []
        }))
        .unwrap();
        assert!(matches!(
            unknown.into_call(),
            Err(CabalError::UnknownFunction(_))
        ));
    }

    #[test]
    fn legacy_request_builds_execute_call() {
        let mut proof = sample_payload();
        let message = execute_message(
            parse_address(ACCOUNT_2).unwrap(),
            U256::from(1000),
            &[],
        );
        proof.message = message.to_string();

        let request = LegacyExecuteRequest::from_json(json!({
            "cabal": CABAL,
            "to": ACCOUNT_2,
            "value": "1000",
            "data": "0x",
            "chainId": "31337",
            "proof": proof,
        }))
        .unwrap();

        let call = request.into_call(None).unwrap();
        assert_eq!(call.descriptor.signature, EXECUTE_SIGNATURE);
        assert_eq!(call.proof().unwrap().message, message);
        assert_eq!(
            call.arg("value"),
            Some(&Token::Uint(U256::from(1000)))
        );
        assert!(call.calldata().is_ok());
    }

    #[test]
    fn legacy_request_needs_a_cabal_address() {
        let request = LegacyExecuteRequest::from_json(json!({
            "to": ACCOUNT_2,
            "value": "1000",
            "data": "0x",
            "chainId": 31337,
            "proof": sample_payload(),
        }))
        .unwrap();

        assert!(matches!(request.into_call(None), Err(CabalError::Schema(_))));
        let fallback = parse_address(CABAL).unwrap();
        assert_eq!(request.into_call(Some(fallback)).unwrap().target, fallback);
    }

    #[test]
    fn legacy_request_schema_failures() {
        let mut short_proof = sample_payload();
        short_proof.points.truncate(7);

        let cases = [
            json!({ "to": ACCOUNT_2, "value": "1.5", "data": "0x", "chainId": 1, "proof": sample_payload() }),
            json!({ "to": ACCOUNT_2, "value": "1", "data": "ab", "chainId": 1, "proof": sample_payload() }),
            json!({ "to": "nope", "value": "1", "data": "0x", "chainId": 1, "proof": sample_payload() }),
            json!({ "to": ACCOUNT_2, "value": "1", "data": "0x", "chainId": 1, "proof": short_proof }),
        ];
        for body in cases {
            assert!(
                matches!(LegacyExecuteRequest::from_json(body.clone()), Err(CabalError::Schema(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn describe_renders_checksummed_target() {
        let request = TxRequest::from_json(json!({
            "target": CABAL.to_lowercase(),
            "chainId": 1,
            "function": "createCabal",
            "args": ["42"]
        }))
        .unwrap();
        let summary = request.into_call().unwrap().describe();
        assert_eq!(summary["address"], CABAL);
        assert_eq!(summary["functionName"], "createCabal");
        assert_eq!(summary["args"], json!(["42"]));
    }

    #[test]
    fn path_chain_id() {
        assert_eq!(parse_chain_id("8453").unwrap(), 8453);
        assert!(parse_chain_id("base").is_err());
    }
}
