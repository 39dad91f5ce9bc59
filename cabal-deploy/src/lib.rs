//! cabal-deploy
//!
//! Deploys the Cabal contracts at vanity addresses through the deterministic
//! CREATE2 proxy and verifies their sources on an Etherscan-compatible
//! explorer.

pub mod artifact;
pub mod deployment;
pub mod explorer;

pub use artifact::{BuildInfo, HardhatArtifact};
pub use deployment::{Deployed, DeploymentPlan};
pub use explorer::{Explorer, VerificationRequest, VerificationStatus};

/// Default vanity prefix for Cabal contracts.
pub const DEFAULT_VANITY: &str = "0xcaba1";

/// Block explorers need time to index a fresh deployment.
pub const DEFAULT_VERIFY_DELAY_SECS: u64 = 30;
