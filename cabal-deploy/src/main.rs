use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use cabal_common::chains::{chain_name, is_testnet};
use cabal_common::create2::{VanityTarget, DETERMINISTIC_DEPLOYER};
use cabal_common::units::{format_ether, truncate_address};
use cabal_deploy::{
    deployment::{self, known_start},
    Deployed, DeploymentPlan, Explorer, HardhatArtifact, VerificationRequest, DEFAULT_VANITY,
    DEFAULT_VERIFY_DELAY_SECS,
};
use clap::{Args, Parser, Subcommand};
use ethers::prelude::*;
use ethers::utils::to_checksum;
use tracing_subscriber::EnvFilter;

const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
const DEFAULT_MAX_ITERATIONS: u64 = 50_000_000;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CREATE2 address a salt iteration would deploy to.
    Address(AddressArgs),
    /// Search for a salt whose address starts with a vanity prefix.
    Mine(MineArgs),
    /// Mine a salt, deploy through the deterministic proxy and verify the sources.
    Deploy(DeployArgs),
    /// Verify an already deployed contract.
    Verify(VerifyArgs),
}

#[derive(Args)]
struct ContractArgs {
    /// Artifact name, e.g. `CabalFactory` or `RelayerRegistry`.
    #[arg(long)]
    contract: String,
    /// Constructor argument, repeated in ABI order.
    #[arg(long = "arg")]
    args: Vec<String>,
    /// Hardhat artifacts directory.
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR)]
    artifacts: PathBuf,
}

impl ContractArgs {
    fn load(&self) -> Result<HardhatArtifact> {
        HardhatArtifact::load(&self.artifacts, &self.contract)
    }
}

#[derive(Args)]
struct VanityArgs {
    /// Address prefix including `0x`.
    #[arg(long, default_value = DEFAULT_VANITY)]
    prefix: String,
    /// Match the prefix against the lowercase address instead of the checksum.
    #[arg(long)]
    case_insensitive: bool,
    /// First salt iteration to try (defaults to the saved start for known contracts).
    #[arg(long)]
    start: Option<u64>,
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: u64,
}

impl VanityArgs {
    fn target(&self) -> Result<VanityTarget> {
        Ok(VanityTarget::new(&self.prefix, !self.case_insensitive)?)
    }
}

#[derive(Args)]
struct AddressArgs {
    #[command(flatten)]
    contract: ContractArgs,
    #[arg(long)]
    iteration: u64,
}

#[derive(Args)]
struct MineArgs {
    #[command(flatten)]
    contract: ContractArgs,
    #[command(flatten)]
    vanity: VanityArgs,
}

#[derive(Args)]
struct ExplorerArgs {
    /// Etherscan-compatible API key. Verification is skipped without one.
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    etherscan_api_key: Option<String>,
    /// Override the explorer API URL for the chain.
    #[arg(long)]
    explorer_url: Option<String>,
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,
    #[arg(long, default_value_t = 20)]
    max_polls: u32,
}

impl ExplorerArgs {
    fn explorer(&self, chain_id: u64) -> Result<Option<Explorer>> {
        let Some(api_key) = self.etherscan_api_key.clone() else {
            return Ok(None);
        };
        let explorer = match &self.explorer_url {
            Some(url) => Explorer::new(url.clone(), api_key),
            None => Explorer::for_chain(chain_id, api_key)?,
        };
        Ok(Some(explorer))
    }
}

#[derive(Args)]
struct DeployArgs {
    #[command(flatten)]
    contract: ContractArgs,
    #[command(flatten)]
    vanity: VanityArgs,
    /// Use this salt iteration instead of mining one.
    #[arg(long)]
    iteration: Option<u64>,
    #[arg(long, env = "RPC_URL")]
    rpc_url: String,
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,
    #[command(flatten)]
    explorer: ExplorerArgs,
    /// Seconds to wait before submitting sources.
    #[arg(long, default_value_t = DEFAULT_VERIFY_DELAY_SECS)]
    verify_delay_secs: u64,
    #[arg(long)]
    no_verify: bool,
}

#[derive(Args)]
struct VerifyArgs {
    #[command(flatten)]
    contract: ContractArgs,
    #[arg(long)]
    address: Address,
    #[arg(long)]
    chain_id: u64,
    /// Needed to look up the Cabal implementation behind a CabalFactory.
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,
    #[command(flatten)]
    explorer: ExplorerArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "cabal_deploy=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Address(opts) => run_address(opts),
        Commands::Mine(opts) => run_mine(opts),
        Commands::Deploy(opts) => run_deploy(opts).await,
        Commands::Verify(opts) => run_verify(opts).await,
    }
}

fn run_address(args: AddressArgs) -> Result<()> {
    let artifact = args.contract.load()?;
    let plan = DeploymentPlan::at_iteration(&artifact, &args.contract.args, args.iteration)?;
    print_plan(&plan);
    Ok(())
}

fn run_mine(args: MineArgs) -> Result<()> {
    let artifact = args.contract.load()?;
    let plan = mine(&artifact, &args.contract, &args.vanity)?;
    print_plan(&plan);
    Ok(())
}

fn mine(artifact: &HardhatArtifact, contract: &ContractArgs, vanity: &VanityArgs) -> Result<DeploymentPlan> {
    let target = vanity.target()?;
    let start = vanity
        .start
        .unwrap_or_else(|| known_start(&artifact.contract_name));
    println!(
        "⛏️  Mining a {} salt for {} from iteration {}",
        target.prefix(),
        artifact.contract_name,
        start
    );
    DeploymentPlan::mine(artifact, &contract.args, &target, start, vanity.max_iterations)
}

fn print_plan(plan: &DeploymentPlan) {
    println!("contract:  {}", plan.contract_name);
    println!("iteration: {}", plan.salt.iteration);
    println!("salt:      {:?}", plan.salt.salt);
    println!("address:   {}", to_checksum(&plan.address(), None));
}

async fn run_deploy(args: DeployArgs) -> Result<()> {
    let artifact = args.contract.load()?;
    let plan = match args.iteration {
        Some(iteration) => DeploymentPlan::at_iteration(&artifact, &args.contract.args, iteration)?,
        None => mine(&artifact, &args.contract, &args.vanity)?,
    };
    print_plan(&plan);

    let provider =
        Provider::<Http>::try_from(args.rpc_url.as_str()).context("Failed to create HTTP provider")?;
    let chain_id = provider
        .get_chainid()
        .await
        .context("Failed to fetch chain id")?
        .as_u64();
    let wallet = args
        .private_key
        .parse::<LocalWallet>()
        .context("Invalid private key")?
        .with_chain_id(chain_id);
    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    let balance = client
        .get_balance(client.address(), None)
        .await
        .context("Failed to fetch deployer balance")?;
    println!(
        "💰 Deployer {} holds {} ETH",
        truncate_address(&to_checksum(&client.address(), None)),
        format_ether(balance)
    );

    println!(
        "🚀 Deploying {} on {} ({}) via {}",
        plan.contract_name,
        chain_name(chain_id),
        chain_id,
        to_checksum(&DETERMINISTIC_DEPLOYER, None)
    );
    if !is_testnet(chain_id) {
        println!("⚠️  {} is a production network; the deployment spends real ETH", chain_name(chain_id));
    }
    let deployed = deployment::deploy(client.as_ref(), &plan).await?;
    match deployed {
        Deployed::Existing(address) => {
            println!("✅ {} already deployed at {}", plan.contract_name, to_checksum(&address, None))
        }
        Deployed::New { address, tx_hash } => println!(
            "✅ Deployed {} to {} (tx {:?})",
            plan.contract_name,
            to_checksum(&address, None),
            tx_hash
        ),
    }

    if args.no_verify {
        return Ok(());
    }
    let Some(explorer) = args.explorer.explorer(chain_id)? else {
        println!("ℹ️  ETHERSCAN_API_KEY not set, skipping verification");
        return Ok(());
    };

    if matches!(deployed, Deployed::New { .. }) {
        println!("⏳ Waiting {}s for the explorer to index the deployment", args.verify_delay_secs);
        tokio::time::sleep(Duration::from_secs(args.verify_delay_secs)).await;
    }

    // Verification failures do not undo a successful deployment.
    if let Err(e) = verify_with_implementation(
        client.as_ref(),
        &explorer,
        &args.explorer,
        &artifact,
        &plan.constructor_args,
        deployed.address(),
        &args.contract.artifacts,
    )
    .await
    {
        eprintln!("⚠️  Verification failed: {:#}", e);
    }
    Ok(())
}

async fn run_verify(args: VerifyArgs) -> Result<()> {
    let artifact = args.contract.load()?;
    let constructor_args = artifact.encode_constructor_args(&args.contract.args)?;
    let explorer = args
        .explorer
        .explorer(args.chain_id)?
        .context("ETHERSCAN_API_KEY is required to verify")?;

    match &args.rpc_url {
        Some(rpc_url) => {
            let provider = Provider::<Http>::try_from(rpc_url.as_str())
                .context("Failed to create HTTP provider")?;
            verify_with_implementation(
                &provider,
                &explorer,
                &args.explorer,
                &artifact,
                &constructor_args,
                args.address,
                &args.contract.artifacts,
            )
            .await
        }
        None => verify_one(&explorer, &args.explorer, &artifact, &constructor_args, args.address).await,
    }
}

/// Verify a contract and, for a CabalFactory, the Cabal implementation it clones.
async fn verify_with_implementation<M>(
    client: &M,
    explorer: &Explorer,
    opts: &ExplorerArgs,
    artifact: &HardhatArtifact,
    constructor_args: &[u8],
    address: Address,
    artifacts_dir: &std::path::Path,
) -> Result<()>
where
    M: Middleware,
    M::Error: 'static,
{
    verify_one(explorer, opts, artifact, constructor_args, address).await?;

    if artifact.contract_name == "CabalFactory" {
        let implementation = deployment::implementation_of(client, address).await?;
        let cabal = HardhatArtifact::load(artifacts_dir, "Cabal")?;
        verify_one(explorer, opts, &cabal, &[], implementation).await?;
    }
    Ok(())
}

async fn verify_one(
    explorer: &Explorer,
    opts: &ExplorerArgs,
    artifact: &HardhatArtifact,
    constructor_args: &[u8],
    address: Address,
) -> Result<()> {
    println!(
        "🔎 Verifying {} at {}",
        artifact.fully_qualified_name(),
        to_checksum(&address, None)
    );
    let request = VerificationRequest {
        address,
        contract_name: artifact.fully_qualified_name(),
        build_info: artifact.build_info()?,
        constructor_args: constructor_args.to_vec(),
    };
    let status = explorer
        .verify(
            &request,
            Duration::from_secs(opts.poll_interval_secs),
            opts.max_polls,
        )
        .await?;
    anyhow::ensure!(
        status.is_success(),
        "{} was not verified: {:?}",
        artifact.contract_name,
        status
    );
    println!("✅ {} verified ({:?})", artifact.contract_name, status);
    Ok(())
}
