//! Deterministic deployment through the CREATE2 proxy.

use anyhow::{anyhow, bail, ensure, Context, Result};
use cabal_common::abi::ContractKind;
use cabal_common::create2::{
    create2_address, deployer_calldata, init_code_hash, mine_salt, salt_for_iteration, MinedSalt,
    VanityTarget, DETERMINISTIC_DEPLOYER,
};
use ethers::abi::Token;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;

use crate::artifact::HardhatArtifact;

/// Starting iterations that previously produced `0xcaba1` addresses.
pub fn known_start(contract_name: &str) -> u64 {
    match contract_name {
        "CabalFactory" => 5_882_000,
        "RelayerRegistry" => 1_208_000,
        _ => 0,
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub contract_name: String,
    pub init_code: Vec<u8>,
    pub constructor_args: Vec<u8>,
    pub salt: MinedSalt,
}

impl DeploymentPlan {
    /// Plan a deployment with the salt for a fixed iteration.
    pub fn at_iteration(artifact: &HardhatArtifact, args: &[String], iteration: u64) -> Result<Self> {
        let init_code = artifact.init_code(args)?;
        let salt = salt_for_iteration(iteration);
        let address = create2_address(DETERMINISTIC_DEPLOYER, salt, init_code_hash(&init_code));
        Ok(Self {
            contract_name: artifact.contract_name.clone(),
            constructor_args: artifact.encode_constructor_args(args)?,
            init_code,
            salt: MinedSalt {
                iteration,
                salt,
                address,
            },
        })
    }

    /// Plan a deployment at the first salt whose address matches `target`.
    pub fn mine(
        artifact: &HardhatArtifact,
        args: &[String],
        target: &VanityTarget,
        start: u64,
        max_iterations: u64,
    ) -> Result<Self> {
        let init_code = artifact.init_code(args)?;
        let salt = mine_salt(
            DETERMINISTIC_DEPLOYER,
            init_code_hash(&init_code),
            target,
            start,
            max_iterations,
        )
        .ok_or_else(|| {
            anyhow!(
                "no salt in {}..{} gives a {} address",
                start,
                start.saturating_add(max_iterations),
                target.prefix()
            )
        })?;

        Ok(Self {
            contract_name: artifact.contract_name.clone(),
            constructor_args: artifact.encode_constructor_args(args)?,
            init_code,
            salt,
        })
    }

    pub fn address(&self) -> Address {
        self.salt.address
    }

    /// Calldata for the deployment proxy.
    pub fn calldata(&self) -> Bytes {
        Bytes::from(deployer_calldata(self.salt.salt, &self.init_code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployed {
    /// Code was already present at the planned address.
    Existing(Address),
    New { address: Address, tx_hash: H256 },
}

impl Deployed {
    pub fn address(&self) -> Address {
        match self {
            Deployed::Existing(address) => *address,
            Deployed::New { address, .. } => *address,
        }
    }
}

/// Send the plan through the proxy unless the contract already exists.
pub async fn deploy<M>(client: &M, plan: &DeploymentPlan) -> Result<Deployed>
where
    M: Middleware,
    M::Error: 'static,
{
    let deployer = DETERMINISTIC_DEPLOYER;
    let proxy_code = client
        .get_code(deployer, None)
        .await
        .context("failed to query the deployment proxy")?;
    ensure!(
        !proxy_code.is_empty(),
        "deterministic deployment proxy {:?} is missing on this chain",
        deployer
    );

    let address = plan.address();
    let existing = client.get_code(address, None).await?;
    if !existing.is_empty() {
        return Ok(Deployed::Existing(address));
    }

    let tx = TransactionRequest::new().to(deployer).data(plan.calldata());
    let pending = client
        .send_transaction(tx, None)
        .await
        .with_context(|| format!("failed to send {} deployment", plan.contract_name))?;
    let tx_hash = pending.tx_hash();

    let receipt = pending
        .await?
        .ok_or_else(|| anyhow!("deployment transaction {:?} was dropped", tx_hash))?;
    if receipt.status != Some(U64::from(1)) {
        bail!("deployment transaction {:?} reverted", tx_hash);
    }

    let code = client.get_code(address, None).await?;
    ensure!(
        !code.is_empty(),
        "no code at {:?} after deployment (constructor reverted?)",
        address
    );

    Ok(Deployed::New { address, tx_hash })
}

/// `CabalFactory.implementation()`: the Cabal template the factory clones.
pub async fn implementation_of<M>(client: &M, factory: Address) -> Result<Address>
where
    M: Middleware,
    M::Error: 'static,
{
    let descriptor = ContractKind::CabalFactory
        .function("implementation()")
        .ok_or_else(|| anyhow!("CabalFactory ABI has no implementation()"))?;
    let calldata = descriptor.function.encode_input(&[])?;

    let tx: TypedTransaction = TransactionRequest::new()
        .to(factory)
        .data(Bytes::from(calldata))
        .into();
    let output = client.call(&tx, None).await?;

    match descriptor.function.decode_output(&output)?.as_slice() {
        [Token::Address(address)] => Ok(*address),
        other => bail!("unexpected implementation() output: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::fixtures::write_artifacts;

    #[test]
    fn iteration_plan_matches_create2() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        let artifact = HardhatArtifact::load(dir.path(), "RelayerRegistry").unwrap();

        let plan = DeploymentPlan::at_iteration(&artifact, &[], 42).unwrap();
        assert_eq!(plan.salt.salt, salt_for_iteration(42));
        assert_eq!(
            plan.address(),
            create2_address(
                DETERMINISTIC_DEPLOYER,
                salt_for_iteration(42),
                init_code_hash(&artifact.bytecode)
            )
        );

        let calldata = plan.calldata();
        assert_eq!(&calldata[..32], salt_for_iteration(42).as_bytes());
        assert_eq!(&calldata[32..], artifact.bytecode.as_slice());
    }

    #[test]
    fn mined_plan_satisfies_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        let artifact = HardhatArtifact::load(dir.path(), "CabalFactory").unwrap();
        let args = vec!["0xcaba1cC2590F1f72041e01346e2e7307065A9108".to_string()];

        let target = VanityTarget::new("0xca", false).unwrap();
        let plan = DeploymentPlan::mine(&artifact, &args, &target, 0, 100_000).unwrap();

        assert!(target.matches(&plan.address()));
        assert_eq!(plan.constructor_args.len(), 32);
        assert_eq!(
            plan.address(),
            DeploymentPlan::at_iteration(&artifact, &args, plan.salt.iteration)
                .unwrap()
                .address()
        );
    }

    #[test]
    fn exhausted_search_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        let artifact = HardhatArtifact::load(dir.path(), "RelayerRegistry").unwrap();

        let target = VanityTarget::new("0xcaba1cabal", false);
        assert!(target.is_err());

        let target = VanityTarget::new("0xcaba1caba1", false).unwrap();
        assert!(DeploymentPlan::mine(&artifact, &[], &target, 0, 10).is_err());
    }

    #[test]
    fn saved_starting_iterations() {
        assert_eq!(known_start("CabalFactory"), 5_882_000);
        assert_eq!(known_start("RelayerRegistry"), 1_208_000);
        assert_eq!(known_start("Cabal"), 0);
    }
}
