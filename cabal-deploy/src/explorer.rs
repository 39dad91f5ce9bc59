//! Etherscan-compatible source verification.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cabal_common::chains::chain_info;
use ethers::types::Address;
use serde::Deserialize;
use tracing::{debug, info};

use crate::artifact::BuildInfo;

const CODE_FORMAT: &str = "solidity-standard-json-input";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    AlreadyVerified,
    Failed(String),
}

impl VerificationStatus {
    pub fn is_done(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified | VerificationStatus::AlreadyVerified
        )
    }

    fn from_result(result: &str) -> Self {
        let lower = result.to_ascii_lowercase();
        if lower.contains("pending") {
            VerificationStatus::Pending
        } else if lower.contains("already verified") {
            VerificationStatus::AlreadyVerified
        } else if lower.starts_with("pass") {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Failed(result.to_string())
        }
    }
}

/// What gets submitted for one contract.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub address: Address,
    /// `path/To.sol:Name`
    pub contract_name: String,
    pub build_info: BuildInfo,
    /// ABI-encoded constructor arguments without the `0x` prefix.
    pub constructor_args: Vec<u8>,
}

pub struct Explorer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl Explorer {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Explorer for a known chain.
    pub fn for_chain(chain_id: u64, api_key: impl Into<String>) -> Result<Self> {
        let api_url = chain_info(chain_id)
            .and_then(|c| c.explorer_api)
            .ok_or_else(|| anyhow!("no block explorer known for chain {}", chain_id))?;
        Ok(Self::new(api_url, api_key))
    }

    /// Submit sources; returns the GUID to poll, or `None` when the
    /// contract is already verified.
    pub async fn submit(&self, request: &VerificationRequest) -> Result<Option<String>> {
        let source = serde_json::to_string(&request.build_info.input)?;
        let address = format!("{:#x}", request.address);
        let compiler_version = request.build_info.compiler_version();
        let constructor_args = hex::encode(&request.constructor_args);

        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", CODE_FORMAT),
            ("contractname", request.contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            // sic: the API spells it this way
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: ApiResponse = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .context("verification request failed")?
            .error_for_status()?
            .json()
            .await
            .context("unexpected verification response")?;
        debug!("verifysourcecode: {:?}", response);

        if response.status == "1" {
            return Ok(Some(response.result));
        }
        if VerificationStatus::from_result(&response.result) == VerificationStatus::AlreadyVerified {
            return Ok(None);
        }
        bail!(
            "verification of {} rejected: {} ({})",
            request.contract_name,
            response.result,
            response.message
        )
    }

    pub async fn status(&self, guid: &str) -> Result<VerificationStatus> {
        let response: ApiResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("status request failed")?
            .error_for_status()?
            .json()
            .await
            .context("unexpected status response")?;
        debug!("checkverifystatus: {:?}", response);

        if response.status == "1" {
            return Ok(VerificationStatus::from_result(&response.result));
        }
        Ok(match VerificationStatus::from_result(&response.result) {
            VerificationStatus::Verified => VerificationStatus::Failed(response.result),
            other => other,
        })
    }

    /// Submit and poll until the explorer reaches a verdict.
    pub async fn verify(
        &self,
        request: &VerificationRequest,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<VerificationStatus> {
        let Some(guid) = self.submit(request).await? else {
            info!("{} is already verified", request.contract_name);
            return Ok(VerificationStatus::AlreadyVerified);
        };
        info!("Submitted {} for verification (guid {})", request.contract_name, guid);

        for _ in 0..max_polls {
            tokio::time::sleep(poll_interval).await;
            let status = self.status(&guid).await?;
            if status.is_done() {
                return Ok(status);
            }
        }
        bail!(
            "verification of {} still pending after {} polls",
            request.contract_name,
            max_polls
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_results() {
        assert_eq!(
            VerificationStatus::from_result("Pending in queue"),
            VerificationStatus::Pending
        );
        assert_eq!(
            VerificationStatus::from_result("Pass - Verified"),
            VerificationStatus::Verified
        );
        assert_eq!(
            VerificationStatus::from_result("Contract source code already verified"),
            VerificationStatus::AlreadyVerified
        );
        assert!(matches!(
            VerificationStatus::from_result("Fail - Unable to verify"),
            VerificationStatus::Failed(_)
        ));
    }

    #[test]
    fn known_chains_have_explorers() {
        assert!(Explorer::for_chain(84532, "key").is_ok());
        assert!(Explorer::for_chain(31337, "key").is_err());
    }
}
