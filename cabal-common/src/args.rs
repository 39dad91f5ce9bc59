//! Coercion of string arguments into ABI tokens.
//!
//! Relay requests carry every argument as a string. Scalars are parsed
//! directly; arrays and tuples are given as JSON text. A tuple that has the
//! shape of a Semaphore proof may also be given as the camelCase proof
//! object.

use std::str::FromStr;

use ethers_core::abi::{Param, ParamType, Token};
use ethers_core::types::{Address, I256, U256};
use ethers_core::utils::to_checksum;
use serde_json::Value;

use crate::proof::{ProofPayload, SemaphoreProof};
use crate::{CabalError, Result};

/// Coerce `args` against the function inputs, position by position.
pub fn coerce_args(inputs: &[Param], args: &[String]) -> Result<Vec<Token>> {
    if inputs.len() != args.len() {
        return Err(CabalError::ArgumentCount {
            expected: inputs.len(),
            got: args.len(),
        });
    }

    inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(idx, (param, raw))| {
            coerce_arg(&param.kind, raw).map_err(|reason| CabalError::InvalidArgument {
                name: param_label(param, idx),
                reason,
            })
        })
        .collect()
}

fn param_label(param: &Param, idx: usize) -> String {
    if param.name.is_empty() {
        format!("#{}", idx)
    } else {
        param.name.clone()
    }
}

/// Coerce one string argument into a token of type `kind`.
pub fn coerce_arg(kind: &ParamType, raw: &str) -> Result<Token, String> {
    match kind {
        ParamType::Array(_) | ParamType::FixedArray(..) | ParamType::Tuple(_) => {
            let value: Value =
                serde_json::from_str(raw).map_err(|e| format!("expected JSON {}: {}", kind, e))?;
            coerce_value(kind, &value)
        }
        _ => coerce_scalar(kind, raw),
    }
}

fn coerce_scalar(kind: &ParamType, raw: &str) -> Result<Token, String> {
    let raw = raw.trim();
    match kind {
        ParamType::Address => parse_address(raw)
            .map(Token::Address)
            .map_err(|e| e.to_string()),
        ParamType::Uint(bits) => {
            let value = parse_uint(raw)?;
            if value.bits() > *bits {
                return Err(format!("{} does not fit in uint{}", raw, bits));
            }
            Ok(Token::Uint(value))
        }
        ParamType::Int(bits) => {
            let value = parse_int(raw)?;
            // intN spans [-2^(N-1), 2^(N-1))
            let limit = U256::one() << (*bits - 1);
            let fits = if value.is_negative() {
                value.twos_complement() <= limit
            } else {
                value.into_raw() < limit
            };
            if !fits {
                return Err(format!("{} does not fit in int{}", raw, bits));
            }
            Ok(Token::Int(value.into_raw()))
        }
        ParamType::Bool => match raw {
            "true" | "1" => Ok(Token::Bool(true)),
            "false" | "0" => Ok(Token::Bool(false)),
            other => Err(format!("expected bool, got {}", other)),
        },
        ParamType::Bytes => parse_hex(raw).map(Token::Bytes),
        ParamType::FixedBytes(len) => {
            let bytes = parse_hex(raw)?;
            if bytes.len() != *len {
                return Err(format!("expected {} bytes, got {}", len, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::String => Ok(Token::String(raw.to_string())),
        other => Err(format!("unsupported scalar type {}", other)),
    }
}

fn coerce_value(kind: &ParamType, value: &Value) -> Result<Token, String> {
    match (kind, value) {
        (ParamType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce_value(inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::Array),
        (ParamType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(format!("expected {} elements, got {}", len, items.len()));
            }
            items
                .iter()
                .map(|item| coerce_value(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        (ParamType::Tuple(fields), Value::Array(items)) => {
            if items.len() != fields.len() {
                return Err(format!(
                    "expected {} tuple fields, got {}",
                    fields.len(),
                    items.len()
                ));
            }
            fields
                .iter()
                .zip(items)
                .map(|(field, item)| coerce_value(field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
        (ParamType::Tuple(_), Value::Object(_)) if SemaphoreProof::is_proof_type(kind) => {
            let payload: ProofPayload =
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            SemaphoreProof::try_from(&payload)
                .map(|proof| proof.to_token())
                .map_err(|e| e.to_string())
        }
        (ParamType::Array(_) | ParamType::FixedArray(..) | ParamType::Tuple(_), _) => {
            Err(format!("expected JSON array for {}", kind))
        }
        (_, Value::String(s)) => coerce_scalar(kind, s),
        (_, Value::Number(n)) => coerce_scalar(kind, &n.to_string()),
        (_, Value::Bool(b)) => coerce_scalar(kind, if *b { "true" } else { "false" }),
        (_, other) => Err(format!("cannot coerce {} into {}", other, kind)),
    }
}

/// Parse an address. Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Result<Address> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| CabalError::InvalidAddress(raw.to_string()))?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CabalError::InvalidAddress(raw.to_string()));
    }

    let address =
        Address::from_str(digits).map_err(|_| CabalError::InvalidAddress(raw.to_string()))?;

    let mixed_case = digits.bytes().any(|b| b.is_ascii_lowercase())
        && digits.bytes().any(|b| b.is_ascii_uppercase());
    if mixed_case && to_checksum(&address, None) != raw {
        return Err(CabalError::InvalidAddress(format!("bad checksum: {}", raw)));
    }

    Ok(address)
}

/// Unsigned integer in decimal or `0x` hex.
pub fn parse_uint(raw: &str) -> Result<U256, String> {
    if let Some(hex_digits) = raw.strip_prefix("0x") {
        if hex_digits.is_empty() {
            return Err("empty hex number".into());
        }
        return U256::from_str_radix(hex_digits, 16).map_err(|e| format!("{}: {:?}", raw, e));
    }
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("expected unsigned integer, got {:?}", raw));
    }
    U256::from_dec_str(raw).map_err(|e| format!("{}: {:?}", raw, e))
}

fn parse_int(raw: &str) -> Result<I256, String> {
    let (negative, magnitude) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let magnitude = parse_uint(magnitude)?;
    let overflow = || format!("{} overflows int256", raw);
    if !negative {
        return I256::try_from(magnitude).map_err(|_| overflow());
    }
    // two's complement negation reaches int256 min, which has no positive twin
    if magnitude > U256::one() << 255 {
        return Err(overflow());
    }
    Ok(I256::from_raw((!magnitude).overflowing_add(U256::one()).0))
}

/// `0x`-prefixed hex into bytes. `0x` alone is the empty byte string.
pub fn parse_hex(raw: &str) -> Result<Vec<u8>, String> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| format!("expected 0x-prefixed hex, got {:?}", raw))?;
    hex::decode(digits).map_err(|e| format!("invalid hex: {}", e))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

/// Render a token as JSON. Integers become decimal strings so that
/// 256-bit values survive JavaScript clients.
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(address) => Value::String(to_checksum(address, None)),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(raw) => Value::String(I256::from_raw(*raw).to_string()),
        Token::Bool(b) => Value::Bool(*b),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::String(s) => Value::String(s.clone()),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}

/// Render a token the way Solidity error messages print arguments.
pub fn token_to_display(token: &Token) -> String {
    match token {
        Token::String(s) => format!("{:?}", s),
        Token::Array(items) | Token::FixedArray(items) => format!(
            "[{}]",
            items.iter().map(token_to_display).collect::<Vec<_>>().join(", ")
        ),
        Token::Tuple(items) => format!(
            "({})",
            items.iter().map(token_to_display).collect::<Vec<_>>().join(", ")
        ),
        other => match token_to_json(other) {
            Value::String(s) => s,
            value => value.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_payload;
    use proptest::prelude::*;

    fn param(name: &str, kind: ParamType) -> Param {
        Param {
            name: name.to_string(),
            kind,
            internal_type: None,
        }
    }

    #[test]
    fn coerces_scalars() {
        assert_eq!(
            coerce_arg(&ParamType::Uint(256), "1000").unwrap(),
            Token::Uint(U256::from(1000))
        );
        assert_eq!(
            coerce_arg(&ParamType::Uint(256), "0x3e8").unwrap(),
            Token::Uint(U256::from(1000))
        );
        assert_eq!(
            coerce_arg(&ParamType::Bool, "true").unwrap(),
            Token::Bool(true)
        );
        assert_eq!(
            coerce_arg(&ParamType::Bytes, "0x").unwrap(),
            Token::Bytes(vec![])
        );
        assert_eq!(
            coerce_arg(&ParamType::String, "https://relay.example.com").unwrap(),
            Token::String("https://relay.example.com".into())
        );
        assert_eq!(
            coerce_arg(&ParamType::Int(256), "-5").unwrap(),
            Token::Int(I256::from(-5).into_raw())
        );
    }

    #[test]
    fn int256_bounds() {
        let min = "-57896044618658097711785492504343953926634992332820282019728792003956564819968";
        let max = "57896044618658097711785492504343953926634992332820282019728792003956564819967";
        assert_eq!(
            coerce_arg(&ParamType::Int(256), min).unwrap(),
            Token::Int(I256::MIN.into_raw())
        );
        assert_eq!(
            coerce_arg(&ParamType::Int(256), max).unwrap(),
            Token::Int(I256::MAX.into_raw())
        );
        assert_eq!(
            coerce_arg(&ParamType::Int(256), "-0").unwrap(),
            Token::Int(U256::zero())
        );
        assert!(coerce_arg(
            &ParamType::Int(256),
            "-57896044618658097711785492504343953926634992332820282019728792003956564819969"
        )
        .is_err());
        assert!(coerce_arg(
            &ParamType::Int(256),
            "57896044618658097711785492504343953926634992332820282019728792003956564819968"
        )
        .is_err());
    }

    #[test]
    fn rejects_out_of_range_and_malformed_scalars() {
        assert!(coerce_arg(&ParamType::Uint(8), "256").is_err());
        assert!(coerce_arg(&ParamType::Uint(8), "255").is_ok());
        assert!(coerce_arg(&ParamType::Int(8), "-128").is_ok());
        assert!(coerce_arg(&ParamType::Int(8), "128").is_err());
        assert!(coerce_arg(&ParamType::Int(8), "-129").is_err());
        assert!(coerce_arg(&ParamType::Uint(256), "-1").is_err());
        assert!(coerce_arg(&ParamType::Uint(256), "12abc").is_err());
        assert!(coerce_arg(&ParamType::Bytes, "1234").is_err());
        assert!(coerce_arg(&ParamType::FixedBytes(4), "0x1234").is_err());
        assert!(coerce_arg(&ParamType::Bool, "yes").is_err());
    }

    #[test]
    fn address_checksum_is_enforced_for_mixed_case() {
        let checksummed = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let address = parse_address(checksummed).unwrap();
        assert_eq!(to_checksum(&address, None), checksummed);

        assert!(parse_address(&checksummed.to_lowercase()).is_ok());
        assert!(parse_address("0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266").is_err());
        assert!(parse_address("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266").is_err());
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn proof_tuple_accepts_object_or_array() {
        let kind = SemaphoreProof::param_type();
        let payload = sample_payload();

        let as_object = serde_json::to_string(&payload).unwrap();
        let from_object = coerce_arg(&kind, &as_object).unwrap();

        let as_array = serde_json::json!([
            payload.merkle_tree_depth,
            payload.merkle_tree_root,
            payload.nullifier,
            payload.message,
            payload.scope,
            payload.points,
        ])
        .to_string();
        let from_array = coerce_arg(&kind, &as_array).unwrap();

        assert_eq!(from_object, from_array);
        assert!(from_object.type_check(&kind));
    }

    #[test]
    fn argument_count_must_match() {
        let inputs = vec![param("amount", ParamType::Uint(256))];
        assert!(matches!(
            coerce_args(&inputs, &[]),
            Err(CabalError::ArgumentCount {
                expected: 1,
                got: 0
            })
        ));
    }

    #[test]
    fn invalid_argument_names_the_parameter() {
        let inputs = vec![param("to", ParamType::Address)];
        let err = coerce_args(&inputs, &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, CabalError::InvalidArgument { name, .. } if name == "to"));
    }

    #[test]
    fn renders_tokens_for_json_and_errors() {
        let token = Token::Tuple(vec![
            Token::Uint(U256::from(7)),
            Token::String("https://relay.example.com".into()),
        ]);
        assert_eq!(
            token_to_json(&token),
            serde_json::json!(["7", "https://relay.example.com"])
        );
        assert_eq!(
            token_to_display(&Token::String("https://relay.example.com".into())),
            "\"https://relay.example.com\""
        );
    }

    proptest! {
        #[test]
        fn uint_decimal_and_hex_agree(value in any::<u128>()) {
            let dec = coerce_arg(&ParamType::Uint(256), &value.to_string()).unwrap();
            let hex = coerce_arg(&ParamType::Uint(256), &format!("{:#x}", value)).unwrap();
            prop_assert_eq!(dec, hex);
        }

        #[test]
        fn rendered_uints_coerce_back(value in any::<u64>()) {
            let token = Token::Uint(U256::from(value));
            let Value::String(rendered) = token_to_json(&token) else {
                panic!("uint renders as string");
            };
            prop_assert_eq!(coerce_arg(&ParamType::Uint(64), &rendered).unwrap(), token);
        }
    }
}
