//! Chain identifiers and per-chain relayer configuration.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::MIN_RELAYER_BALANCE_WEI;

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Ethereum mainnet
pub const MAINNET: u64 = 1;
/// Ethereum Sepolia testnet
pub const SEPOLIA: u64 = 11_155_111;
/// Base
pub const BASE: u64 = 8453;
/// Base Sepolia testnet
pub const BASE_SEPOLIA: u64 = 84_532;
/// Local Hardhat node
pub const HARDHAT: u64 = 31_337;

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN INFO
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    pub chain_id: u64,
    /// Human-readable chain name
    pub name: &'static str,
    /// Etherscan-compatible API endpoint used for source verification
    pub explorer_api: Option<&'static str>,
    pub testnet: bool,
}

pub const KNOWN_CHAINS: &[ChainInfo] = &[
    ChainInfo {
        chain_id: MAINNET,
        name: "Ethereum",
        explorer_api: Some("https://api.etherscan.io/api"),
        testnet: false,
    },
    ChainInfo {
        chain_id: SEPOLIA,
        name: "Sepolia",
        explorer_api: Some("https://api-sepolia.etherscan.io/api"),
        testnet: true,
    },
    ChainInfo {
        chain_id: BASE,
        name: "Base",
        explorer_api: Some("https://api.basescan.org/api"),
        testnet: false,
    },
    ChainInfo {
        chain_id: BASE_SEPOLIA,
        name: "Base Sepolia",
        explorer_api: Some("https://api-sepolia.basescan.org/api"),
        testnet: true,
    },
    ChainInfo {
        chain_id: HARDHAT,
        name: "Hardhat",
        explorer_api: None,
        testnet: true,
    },
];

pub fn chain_info(chain_id: u64) -> Option<&'static ChainInfo> {
    KNOWN_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

pub fn chain_name(chain_id: u64) -> &'static str {
    chain_info(chain_id).map(|c| c.name).unwrap_or("Unknown Chain")
}

/// Unknown chains are treated as production networks.
pub fn is_testnet(chain_id: u64) -> bool {
    chain_info(chain_id).map_or(false, |c| c.testnet)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RELAYER CHAIN CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// One chain the relayer can submit to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: u64,
    pub rpc_url: String,
    /// Balance below which the relayer reports itself as not ready.
    pub min_balance: U256,
}

impl ChainConfig {
    pub fn new(id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            id,
            rpc_url: rpc_url.into(),
            min_balance: U256::from(MIN_RELAYER_BALANCE_WEI),
        }
    }

    pub fn with_min_balance(mut self, min_balance: U256) -> Self {
        self.min_balance = min_balance;
        self
    }

    pub fn name(&self) -> &'static str {
        chain_name(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_known_and_unknown_chains() {
        assert_eq!(chain_name(BASE_SEPOLIA), "Base Sepolia");
        assert_eq!(chain_name(MAINNET), "Ethereum");
        assert_eq!(chain_name(424242), "Unknown Chain");
    }

    #[test]
    fn default_min_balance_is_0_0015_ether() {
        let config = ChainConfig::new(BASE, "http://localhost:8545");
        assert_eq!(
            config.min_balance,
            U256::from(15u64) * U256::exp10(14)
        );
        assert_eq!(config.name(), "Base");
    }

    #[test]
    fn testnets_are_flagged() {
        assert!(is_testnet(BASE_SEPOLIA));
        assert!(is_testnet(HARDHAT));
        assert!(!is_testnet(MAINNET));
        assert!(!is_testnet(424242));
    }

    #[test]
    fn hardhat_has_no_explorer() {
        assert!(chain_info(HARDHAT).unwrap().explorer_api.is_none());
        assert!(chain_info(BASE).unwrap().explorer_api.is_some());
    }
}
