//! Decoding of contract revert data.
//!
//! Simulation failures come back as raw revert bytes. They are matched
//! against the custom errors declared in the three embedded ABIs plus the
//! built-in `Error(string)` and `Panic(uint256)`, and rendered the way the
//! contract declares them, e.g. `NotExpired("https://relay.example.com")`.

use std::collections::HashMap;
use std::fmt;

use ethers_core::abi::{self, ParamType, Token};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::abi::{canonical_signature, selector_of, ContractKind, Selector};
use crate::args::{token_to_display, token_to_json};

#[derive(Debug, Clone)]
struct ErrorShape {
    name: String,
    inputs: Vec<ParamType>,
}

static KNOWN_ERRORS: Lazy<HashMap<Selector, ErrorShape>> = Lazy::new(|| {
    let mut known = HashMap::new();

    for kind in ContractKind::ALL {
        for error in kind.abi().errors.values().flatten() {
            let signature = canonical_signature(&error.name, &error.inputs);
            known.entry(selector_of(&signature)).or_insert(ErrorShape {
                name: error.name.clone(),
                inputs: error.inputs.iter().map(|p| p.kind.clone()).collect(),
            });
        }
    }

    known.insert(
        selector_of("Error(string)"),
        ErrorShape {
            name: "Error".into(),
            inputs: vec![ParamType::String],
        },
    );
    known.insert(
        selector_of("Panic(uint256)"),
        ErrorShape {
            name: "Panic".into(),
            inputs: vec![ParamType::Uint(256)],
        },
    );

    known
});

/// A revert matched against a known error declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRevert {
    pub name: String,
    pub args: Vec<Token>,
}

impl DecodedRevert {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(RevertJson {
            name: &self.name,
            args: self.args.iter().map(token_to_json).collect(),
            display: self.to_string(),
        })
        .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Serialize)]
struct RevertJson<'a> {
    name: &'a str,
    args: Vec<serde_json::Value>,
    display: String,
}

impl fmt::Display for DecodedRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(token_to_display).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// Decode revert data. Returns `None` for empty data, unknown selectors or
/// arguments that do not decode against the declared types.
pub fn decode_revert(data: &[u8]) -> Option<DecodedRevert> {
    if data.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);

    let shape = KNOWN_ERRORS.get(&selector)?;
    let args = abi::decode(&shape.inputs, &data[4..]).ok()?;
    Some(DecodedRevert {
        name: shape.name.clone(),
        args,
    })
}

/// Encode a known error, used by tests and mocks to fabricate reverts.
pub fn encode_revert(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector_of(signature).to_vec();
    data.extend(abi::encode(args));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::U256;

    #[test]
    fn decodes_cabal_errors() {
        for name in [
            "InvalidProof",
            "InvalidIntent",
            "YouAreUsingTheSameNullifierTwice",
            "InsufficientBalance",
            "MerkleTreeRootIsExpired",
        ] {
            let data = encode_revert(&format!("{}()", name), &[]);
            let decoded = decode_revert(&data).unwrap();
            assert_eq!(decoded.name, name);
            assert_eq!(decoded.to_string(), format!("{}()", name));
        }
    }

    #[test]
    fn decodes_registry_errors_with_arguments() {
        let url = "https://relay.example.com";
        let data = encode_revert("AlreadyExists(string)", &[Token::String(url.into())]);
        let decoded = decode_revert(&data).unwrap();
        assert_eq!(decoded.to_string(), format!("AlreadyExists(\"{}\")", url));

        let data = encode_revert("NotExpired(string)", &[Token::String(url.into())]);
        assert_eq!(decode_revert(&data).unwrap().name, "NotExpired");
    }

    #[test]
    fn overloaded_insufficient_balance_is_distinguished() {
        let data = encode_revert(
            "InsufficientBalance(uint256,uint256)",
            &[Token::Uint(U256::from(10)), Token::Uint(U256::from(20))],
        );
        let decoded = decode_revert(&data).unwrap();
        assert_eq!(decoded.to_string(), "InsufficientBalance(10, 20)");
        assert_eq!(decoded.to_json()["args"], serde_json::json!(["10", "20"]));
    }

    #[test]
    fn decodes_require_strings() {
        let data = encode_revert("Error(string)", &[Token::String("nope".into())]);
        assert_eq!(decode_revert(&data).unwrap().to_string(), "Error(\"nope\")");
    }

    #[test]
    fn unknown_or_truncated_data_is_none() {
        assert!(decode_revert(&[]).is_none());
        assert!(decode_revert(&[0xde, 0xad]).is_none());
        assert!(decode_revert(&[0xde, 0xad, 0xbe, 0xef]).is_none());

        // declared string argument but no payload
        let data = selector_of("AlreadyExists(string)").to_vec();
        assert!(decode_revert(&data).is_none());
    }
}
