//! Hardhat build artifacts.
//!
//! `artifacts/contracts/<Name>.sol/<Name>.json` holds the ABI and creation
//! bytecode. The sibling `<Name>.dbg.json` points at the build-info file
//! whose `input` is the solc standard-json input needed for verification.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use cabal_common::args::coerce_args;
use ethers::abi::{self, Abi, Token};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: String,
    source_name: String,
    abi: Abi,
    bytecode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

/// The solc input and compiler version a contract was built with.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    pub input: Value,
}

impl BuildInfo {
    /// Compiler version in the form block explorers expect, e.g. `v0.8.23+commit.f704f362`.
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }
}

#[derive(Debug, Clone)]
pub struct HardhatArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: Abi,
    pub bytecode: Vec<u8>,
    path: PathBuf,
}

impl HardhatArtifact {
    /// Load `<artifacts_dir>/<source>/<name>.json`, searching for the
    /// source file when it is not `contracts/<name>.sol`.
    pub fn load(artifacts_dir: &Path, contract_name: &str) -> Result<Self> {
        let path = find_artifact(artifacts_dir, contract_name)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read artifact {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&raw)
            .with_context(|| format!("malformed artifact {}", path.display()))?;

        if file.bytecode.contains("__$") {
            bail!("{} has unlinked libraries", file.contract_name);
        }
        let digits = file.bytecode.strip_prefix("0x").unwrap_or(&file.bytecode);
        let bytecode = hex::decode(digits)
            .with_context(|| format!("bytecode of {} is not hex", file.contract_name))?;
        ensure!(
            !bytecode.is_empty(),
            "{} has no creation bytecode (abstract contract or interface?)",
            file.contract_name
        );

        Ok(Self {
            contract_name: file.contract_name,
            source_name: file.source_name,
            abi: file.abi,
            bytecode,
            path: path.to_path_buf(),
        })
    }

    /// `contracts/Cabal.sol:Cabal`
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// ABI-encode constructor arguments given as strings.
    pub fn encode_constructor_args(&self, args: &[String]) -> Result<Vec<u8>> {
        match &self.abi.constructor {
            Some(constructor) => {
                let tokens: Vec<Token> = coerce_args(&constructor.inputs, args)
                    .with_context(|| format!("invalid constructor arguments for {}", self.contract_name))?;
                Ok(abi::encode(&tokens))
            }
            None if args.is_empty() => Ok(vec![]),
            None => bail!(
                "{} has no constructor but {} arguments were given",
                self.contract_name,
                args.len()
            ),
        }
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn init_code(&self, args: &[String]) -> Result<Vec<u8>> {
        let mut init_code = self.bytecode.clone();
        init_code.extend(self.encode_constructor_args(args)?);
        Ok(init_code)
    }

    pub fn build_info(&self) -> Result<BuildInfo> {
        let debug_path = self.path.with_extension("dbg.json");
        let raw = fs::read_to_string(&debug_path)
            .with_context(|| format!("failed to read {}", debug_path.display()))?;
        let debug: DebugFile = serde_json::from_str(&raw)
            .with_context(|| format!("malformed {}", debug_path.display()))?;

        let dir = debug_path
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent directory", debug_path.display()))?;
        let build_info_path = dir.join(&debug.build_info);
        let raw = fs::read_to_string(&build_info_path)
            .with_context(|| format!("failed to read build info {}", build_info_path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed build info {}", build_info_path.display()))
    }
}

fn find_artifact(artifacts_dir: &Path, contract_name: &str) -> Result<PathBuf> {
    let file_name = format!("{}.json", contract_name);
    let conventional = artifacts_dir
        .join("contracts")
        .join(format!("{}.sol", contract_name))
        .join(&file_name);
    if conventional.is_file() {
        return Ok(conventional);
    }

    let mut stack = vec![artifacts_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().map_or(false, |n| n == "build-info") {
                    continue;
                }
                stack.push(path);
            } else if path.file_name().map_or(false, |n| n == file_name.as_str()) {
                return Ok(path);
            }
        }
    }

    bail!(
        "no artifact for {} under {} (run `npx hardhat compile` first)",
        contract_name,
        artifacts_dir.display()
    )
}
