//! Intent binding.
//!
//! Every state-changing Cabal function takes a Semaphore proof whose
//! `message` field commits to the action being authorized, so a proof made
//! for one action cannot be replayed for another. The contract enforces this
//! and reverts with `InvalidIntent()`. The relayer recomputes the expected
//! message before simulating so mismatched requests are turned away without
//! an RPC round-trip.
//!
//! | function                              | bound message                                  |
//! |---------------------------------------|------------------------------------------------|
//! | `execute(to, value, data, proof[, fee])` | `uint256(keccak256(abi.encode(to, value, data)))` |
//! | `addMember(commitment, proof)`        | `commitment`                                   |
//! | `setFee(amount, proof)`               | `amount`                                       |

use ethers_core::abi::{self, Token};
use ethers_core::types::{Address, U256};
use ethers_core::utils::keccak256;

use crate::abi::ContractKind;
use crate::request::RelayCall;
use crate::{CabalError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Execute {
        to: Address,
        value: U256,
        data: Vec<u8>,
    },
    AddMember {
        identity_commitment: U256,
    },
    SetFee {
        amount: U256,
    },
    /// Calls that carry no proof, e.g. `CabalFactory.createCabal`.
    Unbound,
}

impl Intent {
    pub fn of(call: &RelayCall) -> Intent {
        if call.descriptor.contract != ContractKind::Cabal {
            return Intent::Unbound;
        }

        match call.descriptor.name() {
            "execute" => {
                let to = call.arg("to").cloned().and_then(Token::into_address);
                let value = call.arg("value").cloned().and_then(Token::into_uint);
                let data = call.arg("data").cloned().and_then(Token::into_bytes);
                match (to, value, data) {
                    (Some(to), Some(value), Some(data)) => Intent::Execute { to, value, data },
                    _ => Intent::Unbound,
                }
            }
            "addMember" => call
                .arg("identityCommitment")
                .cloned()
                .and_then(Token::into_uint)
                .map(|identity_commitment| Intent::AddMember {
                    identity_commitment,
                })
                .unwrap_or(Intent::Unbound),
            "setFee" => call
                .arg("amount")
                .cloned()
                .and_then(Token::into_uint)
                .map(|amount| Intent::SetFee { amount })
                .unwrap_or(Intent::Unbound),
            _ => Intent::Unbound,
        }
    }

    /// The message a proof must carry to authorize this intent.
    pub fn expected_message(&self) -> Option<U256> {
        match self {
            Intent::Execute { to, value, data } => Some(execute_message(*to, *value, data)),
            Intent::AddMember {
                identity_commitment,
            } => Some(*identity_commitment),
            Intent::SetFee { amount } => Some(*amount),
            Intent::Unbound => None,
        }
    }
}

/// `uint256(keccak256(abi.encode(to, value, data)))`
pub fn execute_message(to: Address, value: U256, data: &[u8]) -> U256 {
    let encoded = abi::encode(&[
        Token::Address(to),
        Token::Uint(value),
        Token::Bytes(data.to_vec()),
    ]);
    U256::from_big_endian(&keccak256(encoded))
}

/// Reject calls whose proof is bound to a different action.
pub fn check_intent(call: &RelayCall) -> Result<()> {
    let Some(expected) = Intent::of(call).expected_message() else {
        return Ok(());
    };
    let Some(proof) = call.proof() else {
        return Ok(());
    };
    if proof.message != expected {
        return Err(CabalError::InvalidIntent {
            expected,
            got: proof.message,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::parse_address;
    use crate::fixtures::sample_payload;
    use crate::request::TxRequest;
    use serde_json::json;

    const CABAL: &str = "0xcaba15de77BC1a93556347030D299995dFE777c6";
    const ACCOUNT_2: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn proof_arg(message: U256) -> String {
        let mut payload = sample_payload();
        payload.message = message.to_string();
        serde_json::to_string(&payload).unwrap()
    }

    fn call(function: &str, args: Vec<String>) -> RelayCall {
        TxRequest::from_json(json!({
            "target": CABAL,
            "chainId": 31337,
            "function": function,
            "args": args,
        }))
        .unwrap()
        .into_call()
        .unwrap()
    }

    #[test]
    fn execute_message_matches_abi_encoding() {
        let to = parse_address(ACCOUNT_2).unwrap();
        let message = execute_message(to, U256::from(1000), &[]);

        // address, uint256, offset, length: four words, no data words
        let encoded = abi::encode(&[
            Token::Address(to),
            Token::Uint(U256::from(1000)),
            Token::Bytes(vec![]),
        ]);
        assert_eq!(encoded.len(), 4 * 32);
        assert_eq!(message, U256::from_big_endian(&keccak256(&encoded)));
        assert_ne!(message, execute_message(to, U256::from(1001), &[]));
        assert_ne!(message, execute_message(to, U256::from(1000), &[0x01]));
    }

    #[test]
    fn execute_with_matching_message_passes() {
        let to = parse_address(ACCOUNT_2).unwrap();
        let message = execute_message(to, U256::from(1000), &[]);
        let call = call(
            "execute",
            vec![ACCOUNT_2.into(), "1000".into(), "0x".into(), proof_arg(message)],
        );
        assert!(matches!(Intent::of(&call), Intent::Execute { .. }));
        assert!(check_intent(&call).is_ok());
    }

    #[test]
    fn execute_with_unsigned_message_is_rejected() {
        let call = call(
            "execute",
            vec![ACCOUNT_2.into(), "1000".into(), "0x".into(), proof_arg(U256::one())],
        );
        assert!(matches!(
            check_intent(&call),
            Err(CabalError::InvalidIntent { got, .. }) if got == U256::one()
        ));
    }

    #[test]
    fn execute_with_fee_binds_the_same_message() {
        let to = parse_address(ACCOUNT_2).unwrap();
        let message = execute_message(to, U256::from(5), &[0xab]);
        let call = call(
            "execute",
            vec![
                ACCOUNT_2.into(),
                "5".into(),
                "0xab".into(),
                proof_arg(message),
                "true".into(),
            ],
        );
        assert_eq!(call.descriptor.inputs().len(), 5);
        assert!(check_intent(&call).is_ok());
    }

    #[test]
    fn set_fee_binds_amount() {
        let ok = call("setFee", vec!["1000".into(), proof_arg(U256::from(1000))]);
        assert!(check_intent(&ok).is_ok());

        // a proof for fee 1000 cannot set fee 69
        let replayed = call("setFee", vec!["69".into(), proof_arg(U256::from(1000))]);
        assert!(matches!(
            check_intent(&replayed),
            Err(CabalError::InvalidIntent { expected, .. }) if expected == U256::from(69)
        ));
    }

    #[test]
    fn add_member_binds_commitment() {
        let commitment = U256::from_dec_str("123456789").unwrap();
        let ok = call(
            "addMember",
            vec![commitment.to_string(), proof_arg(commitment)],
        );
        assert_eq!(
            Intent::of(&ok),
            Intent::AddMember {
                identity_commitment: commitment
            }
        );
        assert!(check_intent(&ok).is_ok());

        let other = call("addMember", vec!["1".into(), proof_arg(commitment)]);
        assert!(check_intent(&other).is_err());
    }

    #[test]
    fn factory_calls_are_unbound() {
        let create = call("createCabal", vec!["42".into()]);
        assert_eq!(Intent::of(&create), Intent::Unbound);
        assert!(check_intent(&create).is_ok());
    }
}
