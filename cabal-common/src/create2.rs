//! CREATE2 address derivation and vanity salt mining.
//!
//! Contracts are deployed through the deterministic deployment proxy, so the
//! final address depends only on the salt and the init code. Mining walks
//! salts `start, start + 1, ...` (each encoded as a big-endian uint256) until
//! the checksummed address starts with the requested prefix.

use ethers_core::types::{Address, H160, H256};
use ethers_core::utils::{get_create2_address_from_hash, keccak256, to_checksum};
use rayon::prelude::*;

use crate::{CabalError, Result};

/// Arachnid's deterministic deployment proxy, present at the same address on
/// every chain we deploy to.
/// `0x4e59b44847b379578588920cA78FbF26c0B4956C`
pub const DETERMINISTIC_DEPLOYER: Address = H160([
    0x4e, 0x59, 0xb4, 0x48, 0x47, 0xb3, 0x79, 0x57, 0x85, 0x88, 0x92, 0x0c, 0xa7, 0x8f, 0xbf, 0x26,
    0xc0, 0xb4, 0x95, 0x6c,
]);

pub fn salt_for_iteration(iteration: u64) -> H256 {
    let mut salt = [0u8; 32];
    salt[24..].copy_from_slice(&iteration.to_be_bytes());
    H256(salt)
}

pub fn init_code_hash(init_code: &[u8]) -> H256 {
    H256(keccak256(init_code))
}

pub fn create2_address(deployer: Address, salt: H256, init_code_hash: H256) -> Address {
    get_create2_address_from_hash(deployer, salt.as_bytes(), init_code_hash.as_bytes())
}

/// Calldata for the deployment proxy: `salt ++ init_code`.
pub fn deployer_calldata(salt: H256, init_code: &[u8]) -> Vec<u8> {
    let mut calldata = salt.as_bytes().to_vec();
    calldata.extend_from_slice(init_code);
    calldata
}

// ═══════════════════════════════════════════════════════════════════════════════
// VANITY MINING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanityTarget {
    prefix: String,
    case_sensitive: bool,
}

impl VanityTarget {
    /// `prefix` includes the `0x`, e.g. `0xcaba1`.
    pub fn new(prefix: &str, case_sensitive: bool) -> Result<Self> {
        let digits = prefix
            .strip_prefix("0x")
            .ok_or_else(|| CabalError::InvalidPrefix(format!("{} must start with 0x", prefix)))?;
        if digits.len() > 40 {
            return Err(CabalError::InvalidPrefix(format!(
                "{} is longer than an address",
                prefix
            )));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CabalError::InvalidPrefix(format!(
                "{} is not hexadecimal",
                prefix
            )));
        }

        let prefix = if case_sensitive {
            prefix.to_string()
        } else {
            prefix.to_ascii_lowercase()
        };
        Ok(Self {
            prefix,
            case_sensitive,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, address: &Address) -> bool {
        if self.case_sensitive {
            to_checksum(address, None).starts_with(&self.prefix)
        } else {
            format!("{:#x}", address).starts_with(&self.prefix)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinedSalt {
    pub iteration: u64,
    pub salt: H256,
    pub address: Address,
}

/// Search `max_iterations` salts from `start` in parallel, returning the
/// lowest matching iteration.
pub fn mine_salt(
    deployer: Address,
    init_code_hash: H256,
    target: &VanityTarget,
    start: u64,
    max_iterations: u64,
) -> Option<MinedSalt> {
    let end = start.saturating_add(max_iterations);
    (start..end).into_par_iter().find_first(|&iteration| {
        let address = create2_address(deployer, salt_for_iteration(iteration), init_code_hash);
        target.matches(&address)
    })
    .map(|iteration| {
        let salt = salt_for_iteration(iteration);
        MinedSalt {
            iteration,
            salt,
            address: create2_address(deployer, salt, init_code_hash),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn salt(hex_str: &str) -> H256 {
        hex_str.parse().unwrap()
    }

    #[test]
    fn deployer_constant_is_the_proxy() {
        assert_eq!(
            to_checksum(&DETERMINISTIC_DEPLOYER, None),
            "0x4e59b44847b379578588920cA78FbF26c0B4956C"
        );
    }

    #[test]
    fn eip1014_vectors() {
        let zero_salt = H256::zero();
        assert_eq!(
            to_checksum(
                &create2_address(Address::zero(), zero_salt, init_code_hash(&[0x00])),
                None
            ),
            "0x4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38"
        );
        assert_eq!(
            to_checksum(
                &create2_address(
                    addr("0xdeadbeef00000000000000000000000000000000"),
                    zero_salt,
                    init_code_hash(&[0x00])
                ),
                None
            ),
            "0xB928f69Bb1D91Cd65274e3c79d8986362984fDA3"
        );
        assert_eq!(
            to_checksum(
                &create2_address(
                    addr("0x00000000000000000000000000000000deadbeef"),
                    salt("0x00000000000000000000000000000000000000000000000000000000cafebabe"),
                    init_code_hash(&[0xde, 0xad, 0xbe, 0xef])
                ),
                None
            ),
            "0x60f3f640a8508fC6a86d45DF051962668E1e8AC7"
        );
    }

    #[test]
    fn salt_is_big_endian_iteration() {
        let salt = salt_for_iteration(0x0102);
        assert_eq!(salt.as_bytes()[30..], [0x01, 0x02]);
        assert!(salt.as_bytes()[..30].iter().all(|b| *b == 0));
    }

    #[test]
    fn calldata_is_salt_then_init_code() {
        let calldata = deployer_calldata(salt_for_iteration(7), &[0xaa, 0xbb]);
        assert_eq!(calldata.len(), 34);
        assert_eq!(calldata[31], 7);
        assert_eq!(&calldata[32..], &[0xaa, 0xbb]);
    }

    #[test]
    fn rejects_bad_prefixes() {
        assert!(VanityTarget::new("caba1", true).is_err());
        assert!(VanityTarget::new("0xcabz", true).is_err());
        assert!(VanityTarget::new(&format!("0x{}", "a".repeat(41)), false).is_err());
        assert!(VanityTarget::new("0xcaba1", true).is_ok());
    }

    #[test]
    fn mines_lowest_matching_iteration() {
        let hash = init_code_hash(&[0x00]);
        let target = VanityTarget::new("0xab", false).unwrap();
        let mined = mine_salt(DETERMINISTIC_DEPLOYER, hash, &target, 0, 10_000).unwrap();

        assert_eq!(mined.iteration, 323);
        assert_eq!(
            to_checksum(&mined.address, None),
            "0xAb6C265e87Eb1ce4adf60A6C5aA2830Cd0Fd5b17"
        );
        assert_eq!(
            mined.address,
            create2_address(DETERMINISTIC_DEPLOYER, mined.salt, hash)
        );
    }

    #[test]
    fn case_sensitive_prefix_uses_checksum() {
        let address = addr("0xAb6C265e87Eb1ce4adf60A6C5aA2830Cd0Fd5b17");
        assert!(VanityTarget::new("0xAb", true).unwrap().matches(&address));
        assert!(!VanityTarget::new("0xab", true).unwrap().matches(&address));
        assert!(VanityTarget::new("0xAB", false).unwrap().matches(&address));
    }

    #[test]
    fn exhausted_search_returns_none() {
        let hash = init_code_hash(&[0x00]);
        let target = VanityTarget::new("0xab", false).unwrap();
        assert!(mine_salt(DETERMINISTIC_DEPLOYER, hash, &target, 0, 323).is_none());
    }
}
