//! Chain clients used to simulate and submit relayed calls.

use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use cabal_common::revert::decode_revert;
use cabal_common::RelayCall;
use ethers::{
    prelude::*,
    providers::MiddlewareError,
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, H256, U256},
};
use tracing::{debug, info};

use crate::error::RelayError;

/// A signing connection to one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Address that pays for relayed transactions.
    fn relayer_address(&self) -> Address;

    async fn balance(&self) -> Result<U256, RelayError>;

    /// `eth_call` the relayed call from the relayer account.
    async fn simulate(&self, call: &RelayCall) -> Result<Bytes, RelayError>;

    /// Sign and broadcast. Returns once the node has accepted the transaction.
    async fn submit(&self, call: &RelayCall) -> Result<H256, RelayError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVM CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct EvmClient {
    chain_id: u64,
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl EvmClient {
    /// Connect to a chain whose id is already known. Does not touch the network.
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> anyhow::Result<Self> {
        let provider =
            Provider::<Http>::try_from(rpc_url).context("Failed to create HTTP provider")?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(chain_id);

        Ok(Self {
            chain_id,
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }

    /// Connect and ask the node for its chain id. When `expected` is given the
    /// node must agree with it.
    pub async fn discover(
        rpc_url: &str,
        private_key: &str,
        expected: Option<u64>,
    ) -> anyhow::Result<Self> {
        let provider =
            Provider::<Http>::try_from(rpc_url).context("Failed to create HTTP provider")?;
        let remote = provider
            .get_chainid()
            .await
            .with_context(|| format!("Failed to fetch chain id from {}", rpc_url))?
            .as_u64();

        if let Some(expected) = expected {
            if expected != remote {
                bail!(
                    "RPC endpoint {} serves chain {} but chain {} was configured",
                    rpc_url,
                    remote,
                    expected
                );
            }
        }
        info!("RPC endpoint {} serves chain {}", rpc_url, remote);
        Self::new(rpc_url, private_key, remote)
    }

    fn transaction(&self, call: &RelayCall) -> Result<TransactionRequest, RelayError> {
        Ok(TransactionRequest::new()
            .from(self.relayer_address())
            .to(call.target)
            .value(call.value())
            .data(call.calldata()?))
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn relayer_address(&self) -> Address {
        self.client.address()
    }

    async fn balance(&self) -> Result<U256, RelayError> {
        self.client
            .get_balance(self.relayer_address(), None)
            .await
            .map_err(classify)
    }

    async fn simulate(&self, call: &RelayCall) -> Result<Bytes, RelayError> {
        let tx: TypedTransaction = self.transaction(call)?.into();
        debug!(
            chain_id = self.chain_id,
            target = ?call.target,
            function = %call.descriptor.signature,
            "Simulating call"
        );
        self.client.call(&tx, None).await.map_err(classify)
    }

    async fn submit(&self, call: &RelayCall) -> Result<H256, RelayError> {
        let tx = self.transaction(call)?;
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(classify)?;
        let tx_hash = pending.tx_hash();
        info!(chain_id = self.chain_id, "Transaction submitted: {:?}", tx_hash);
        Ok(tx_hash)
    }
}

/// Sort a middleware failure into revert, node error or transport failure.
fn classify<E: MiddlewareError>(err: E) -> RelayError {
    if let Some(response) = err.as_error_response() {
        if let Some(data) = response.as_revert_data() {
            let revert = decode_revert(&data);
            return RelayError::Reverted { revert, data };
        }
        return RelayError::Rpc(response.message.clone());
    }
    RelayError::Transport(err.to_string())
}
