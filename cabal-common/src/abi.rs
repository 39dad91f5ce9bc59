//! Embedded contract ABIs and selector dispatch.
//!
//! The relayer only forwards state-changing calls on `CabalFactory` and
//! `Cabal`. Incoming requests name the target function by 4-byte selector,
//! by bare name or by full signature; this module resolves them against a
//! map built once at load time.

use std::collections::HashMap;
use std::fmt;

use ethers_core::abi::{Abi, Function, Param, StateMutability};
use ethers_core::utils::keccak256;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{CabalError, Result};

pub type Selector = [u8; 4];

const CABAL_ABI_JSON: &str = include_str!("../abi/Cabal.json");
const CABAL_FACTORY_ABI_JSON: &str = include_str!("../abi/CabalFactory.json");
const RELAYER_REGISTRY_ABI_JSON: &str = include_str!("../abi/RelayerRegistry.json");

static CABAL_ABI: Lazy<Abi> = Lazy::new(|| parse_embedded(CABAL_ABI_JSON, "Cabal"));
static CABAL_FACTORY_ABI: Lazy<Abi> =
    Lazy::new(|| parse_embedded(CABAL_FACTORY_ABI_JSON, "CabalFactory"));
static RELAYER_REGISTRY_ABI: Lazy<Abi> =
    Lazy::new(|| parse_embedded(RELAYER_REGISTRY_ABI_JSON, "RelayerRegistry"));

/// Nonpayable functions the relayer is willing to pay gas for.
pub static RELAYABLE_FUNCTIONS: Lazy<AbiRegistry> =
    Lazy::new(|| AbiRegistry::nonpayable(&ContractKind::RELAYABLE));

// Only fed `include_str!` data, which `embedded_abis_parse` covers.
fn parse_embedded(json: &str, name: &str) -> Abi {
    serde_json::from_str(json)
        .unwrap_or_else(|err| panic!("embedded {} ABI is malformed: {}", name, err))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    Cabal,
    CabalFactory,
    RelayerRegistry,
}

impl ContractKind {
    pub const ALL: [ContractKind; 3] = [
        ContractKind::Cabal,
        ContractKind::CabalFactory,
        ContractKind::RelayerRegistry,
    ];

    /// Lookup order for relay requests: factory first, then the wallet.
    pub const RELAYABLE: [ContractKind; 2] = [ContractKind::CabalFactory, ContractKind::Cabal];

    pub fn name(&self) -> &'static str {
        match self {
            ContractKind::Cabal => "Cabal",
            ContractKind::CabalFactory => "CabalFactory",
            ContractKind::RelayerRegistry => "RelayerRegistry",
        }
    }

    pub fn abi(&self) -> &'static Abi {
        match self {
            ContractKind::Cabal => &CABAL_ABI,
            ContractKind::CabalFactory => &CABAL_FACTORY_ABI,
            ContractKind::RelayerRegistry => &RELAYER_REGISTRY_ABI,
        }
    }

    /// Find a function of this contract by its canonical signature.
    pub fn function(&self, signature: &str) -> Option<CallDescriptor> {
        let wanted = compact_signature(signature);
        self.abi()
            .functions()
            .find(|f| canonical_signature(&f.name, &f.inputs) == wanted)
            .map(|f| CallDescriptor::new(*self, f.clone()))
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ContractKind {
    type Err = CabalError;

    fn from_str(s: &str) -> Result<Self> {
        ContractKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CabalError::UnknownFunction(format!("unknown contract {}", s)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// A function of a known contract, tagged with the contract it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub contract: ContractKind,
    pub function: Function,
    pub selector: Selector,
    pub signature: String,
}

impl CallDescriptor {
    pub fn new(contract: ContractKind, function: Function) -> Self {
        let signature = canonical_signature(&function.name, &function.inputs);
        let selector = selector_of(&signature);
        Self {
            contract,
            function,
            selector,
            signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn inputs(&self) -> &[Param] {
        &self.function.inputs
    }

    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector))
    }
}

/// `name(type1,type2,...)` with canonical parameter types.
pub fn canonical_signature(name: &str, inputs: &[Param]) -> String {
    let types: Vec<String> = inputs.iter().map(|p| p.kind.to_string()).collect();
    format!("{}({})", name, types.join(","))
}

pub fn selector_of(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn compact_signature(signature: &str) -> String {
    signature.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Parse `0x` + 8 hex characters into a selector.
pub fn parse_selector(raw: &str) -> Option<Selector> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.len() != 8 {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&bytes);
    Some(selector)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Load-time map from selector to call descriptor.
#[derive(Debug, Clone)]
pub struct AbiRegistry {
    entries: Vec<CallDescriptor>,
    by_selector: HashMap<Selector, usize>,
}

impl AbiRegistry {
    /// Collect the nonpayable functions of `contracts`. When two contracts
    /// share a selector the earlier contract wins.
    pub fn nonpayable(contracts: &[ContractKind]) -> Self {
        let mut entries = Vec::new();
        let mut by_selector = HashMap::new();

        for kind in contracts {
            for function in kind.abi().functions() {
                if function.state_mutability != StateMutability::NonPayable {
                    continue;
                }
                let descriptor = CallDescriptor::new(*kind, function.clone());
                if by_selector.contains_key(&descriptor.selector) {
                    continue;
                }
                by_selector.insert(descriptor.selector, entries.len());
                entries.push(descriptor);
            }
        }

        Self {
            entries,
            by_selector,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallDescriptor> {
        self.entries.iter()
    }

    pub fn by_selector(&self, selector: Selector) -> Option<&CallDescriptor> {
        self.by_selector.get(&selector).map(|&idx| &self.entries[idx])
    }

    /// Resolve a function reference from a relay request.
    ///
    /// `reference` may be a `0x`-prefixed selector, a full signature such as
    /// `setFee(uint256,(uint256,uint256,uint256,uint256,uint256,uint256[8]))`,
    /// or a bare name. Bare names are disambiguated by `arg_count`.
    pub fn resolve(&self, reference: &str, arg_count: usize) -> Result<&CallDescriptor> {
        let reference = reference.trim();

        if let Some(selector) = parse_selector(reference) {
            return self
                .by_selector(selector)
                .ok_or_else(|| CabalError::UnknownFunction(reference.to_string()));
        }

        if reference.contains('(') {
            let wanted = compact_signature(reference);
            return self
                .entries
                .iter()
                .find(|d| d.signature == wanted)
                .ok_or_else(|| CabalError::UnknownFunction(reference.to_string()));
        }

        let named: Vec<&CallDescriptor> = self
            .entries
            .iter()
            .filter(|d| d.name() == reference)
            .collect();
        if named.is_empty() {
            return Err(CabalError::UnknownFunction(reference.to_string()));
        }

        let mut matching = named.iter().filter(|d| d.inputs().len() == arg_count);
        match (matching.next(), matching.next()) {
            (Some(found), None) => Ok(found),
            (Some(_), Some(_)) => Err(CabalError::AmbiguousFunction(reference.to_string())),
            (None, _) => Err(CabalError::ArgumentCount {
                expected: named[0].inputs().len(),
                got: arg_count,
            }),
        }
    }
}
