//! Semaphore proof payloads.
//!
//! The relayer never inspects a proof beyond its shape; verification is the
//! contract's job. [`ProofPayload`] is the wire form (decimal strings),
//! [`SemaphoreProof`] the parsed form encoded as the Solidity tuple
//! `(uint256,uint256,uint256,uint256,uint256,uint256[8])`.

use ethers_core::abi::{ParamType, Token};
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::{CabalError, Result, PROOF_POINTS};

/// Proof as it arrives over HTTP: every field a string of decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPayload {
    pub merkle_tree_depth: String,
    pub merkle_tree_root: String,
    pub nullifier: String,
    pub message: String,
    pub scope: String,
    pub points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreProof {
    pub merkle_tree_depth: U256,
    pub merkle_tree_root: U256,
    pub nullifier: U256,
    pub message: U256,
    pub scope: U256,
    pub points: [U256; PROOF_POINTS],
}

impl ProofPayload {
    /// Shape checks: digit-only fields and exactly eight points.
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            ("merkleTreeDepth", &self.merkle_tree_depth),
            ("merkleTreeRoot", &self.merkle_tree_root),
            ("nullifier", &self.nullifier),
            ("message", &self.message),
            ("scope", &self.scope),
        ];
        for (field, value) in scalars {
            if !is_decimal(value) {
                return Err(CabalError::Schema(format!(
                    "proof.{} must match ^[0-9]+$",
                    field
                )));
            }
        }

        if self.points.len() != PROOF_POINTS {
            return Err(CabalError::Schema(format!(
                "proof.points must contain exactly {} elements, got {}",
                PROOF_POINTS,
                self.points.len()
            )));
        }
        if let Some(idx) = self.points.iter().position(|p| !is_decimal(p)) {
            return Err(CabalError::Schema(format!(
                "proof.points[{}] must match ^[0-9]+$",
                idx
            )));
        }

        Ok(())
    }
}

impl TryFrom<&ProofPayload> for SemaphoreProof {
    type Error = CabalError;

    fn try_from(payload: &ProofPayload) -> Result<Self> {
        payload.validate()?;

        let mut points = [U256::zero(); PROOF_POINTS];
        for (slot, raw) in points.iter_mut().zip(&payload.points) {
            *slot = parse_decimal(raw)?;
        }

        Ok(Self {
            merkle_tree_depth: parse_decimal(&payload.merkle_tree_depth)?,
            merkle_tree_root: parse_decimal(&payload.merkle_tree_root)?,
            nullifier: parse_decimal(&payload.nullifier)?,
            message: parse_decimal(&payload.message)?,
            scope: parse_decimal(&payload.scope)?,
            points,
        })
    }
}

impl SemaphoreProof {
    /// ABI type of the proof tuple.
    pub fn param_type() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::FixedArray(Box::new(ParamType::Uint(256)), PROOF_POINTS),
        ])
    }

    pub fn is_proof_type(kind: &ParamType) -> bool {
        *kind == Self::param_type()
    }

    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(self.merkle_tree_depth),
            Token::Uint(self.merkle_tree_root),
            Token::Uint(self.nullifier),
            Token::Uint(self.message),
            Token::Uint(self.scope),
            Token::FixedArray(self.points.iter().copied().map(Token::Uint).collect()),
        ])
    }

    pub fn from_token(token: &Token) -> Option<Self> {
        let Token::Tuple(fields) = token else {
            return None;
        };
        let [depth, root, nullifier, message, scope, Token::FixedArray(raw_points)] =
            fields.as_slice()
        else {
            return None;
        };
        if raw_points.len() != PROOF_POINTS {
            return None;
        }

        let mut points = [U256::zero(); PROOF_POINTS];
        for (slot, point) in points.iter_mut().zip(raw_points) {
            *slot = point.clone().into_uint()?;
        }

        Some(Self {
            merkle_tree_depth: depth.clone().into_uint()?,
            merkle_tree_root: root.clone().into_uint()?,
            nullifier: nullifier.clone().into_uint()?,
            message: message.clone().into_uint()?,
            scope: scope.clone().into_uint()?,
            points,
        })
    }

    pub fn to_payload(&self) -> ProofPayload {
        ProofPayload {
            merkle_tree_depth: self.merkle_tree_depth.to_string(),
            merkle_tree_root: self.merkle_tree_root.to_string(),
            nullifier: self.nullifier.to_string(),
            message: self.message.to_string(),
            scope: self.scope.to_string(),
            points: self.points.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn is_decimal(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a decimal string that may not exceed 256 bits.
pub fn parse_decimal(value: &str) -> Result<U256> {
    U256::from_dec_str(value).map_err(|_| CabalError::InvalidNumber(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_payload;

    #[test]
    fn parses_camel_case_payload() {
        let json = serde_json::to_value(sample_payload()).unwrap();
        assert!(json.get("merkleTreeDepth").is_some());

        let payload: ProofPayload = serde_json::from_value(json).unwrap();
        let proof = SemaphoreProof::try_from(&payload).unwrap();
        assert_eq!(proof.merkle_tree_depth, U256::one());
        assert_eq!(proof.to_payload(), payload);
    }

    #[test]
    fn rejects_wrong_point_count() {
        let mut payload = sample_payload();
        payload.points.pop();
        let err = SemaphoreProof::try_from(&payload).unwrap_err();
        assert!(matches!(err, CabalError::Schema(msg) if msg.contains("exactly 8")));
    }

    #[test]
    fn rejects_non_decimal_fields() {
        let mut payload = sample_payload();
        payload.nullifier = "0x1234".into();
        assert!(matches!(
            SemaphoreProof::try_from(&payload),
            Err(CabalError::Schema(_))
        ));

        let mut payload = sample_payload();
        payload.points[3] = "-1".into();
        assert!(matches!(
            SemaphoreProof::try_from(&payload),
            Err(CabalError::Schema(msg)) if msg.contains("points[3]")
        ));
    }

    #[test]
    fn rejects_values_wider_than_256_bits() {
        let mut payload = sample_payload();
        payload.scope = "9".repeat(90);
        assert!(matches!(
            SemaphoreProof::try_from(&payload),
            Err(CabalError::InvalidNumber(_))
        ));
    }

    #[test]
    fn token_matches_param_type() {
        let proof = SemaphoreProof::try_from(&sample_payload()).unwrap();
        let token = proof.to_token();
        assert!(token.type_check(&SemaphoreProof::param_type()));
        assert_eq!(SemaphoreProof::from_token(&token), Some(proof));
        assert_eq!(SemaphoreProof::from_token(&Token::Bool(true)), None);
    }
}
