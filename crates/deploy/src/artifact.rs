//! Compiled contract artifacts as produced by the Hardhat toolchain.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{B256, Bytes, keccak256};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::DeployError;

/// Directory Hardhat writes compiler inputs and outputs to, inside the artifacts root.
const BUILD_INFO_DIR: &str = "build-info";

/// Anything the executor can deploy: creation bytecode, its ABI and encoded constructor arguments.
pub trait ContractSpec {
    /// Contract name, used for logging and the journal.
    fn name(&self) -> &str;

    /// The JSON ABI.
    fn abi(&self) -> &Value;

    /// Creation bytecode, without constructor arguments.
    fn bytecode(&self) -> &Bytes;

    /// ABI-encoded constructor arguments appended to the bytecode.
    fn constructor_args(&self) -> &Bytes;

    fn bytecode_hash(&self) -> B256 {
        keccak256(self.bytecode())
    }

    /// The transaction input of the contract creation.
    fn init_code(&self) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode().len() + self.constructor_args().len());
        code.extend_from_slice(self.bytecode());
        code.extend_from_slice(self.constructor_args());
        code.into()
    }

    /// Number of inputs the ABI constructor takes.
    fn constructor_inputs(&self) -> usize {
        self.abi()
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item["type"] == "constructor")
                    .and_then(|ctor| ctor["inputs"].as_array())
                    .map(Vec::len)
            })
            .unwrap_or(0)
    }

    /// Local sanity checks before anything is sent to a node.
    fn validate(&self) -> Result<(), DeployError> {
        if self.bytecode().is_empty() {
            return Err(DeployError::Artifact(format!(
                "{} has no creation bytecode (abstract contract or interface?)",
                self.name()
            )));
        }

        let inputs = self.constructor_inputs();
        let args = self.constructor_args();

        if inputs > 0 && args.is_empty() {
            return Err(DeployError::Artifact(format!(
                "{} constructor takes {} argument(s) but none were provided",
                self.name(),
                inputs
            )));
        }

        if inputs == 0 && !args.is_empty() {
            return Err(DeployError::Artifact(format!(
                "{} constructor takes no arguments but {} bytes were provided",
                self.name(),
                args.len()
            )));
        }

        Ok(())
    }
}

/// On-disk layout of `artifacts/<source>/<Name>.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: String,
    source_name: String,
    abi: Value,
    bytecode: String,
}

/// A Hardhat contract artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardhatArtifact {
    pub contract_name: String,
    /// Source file the contract was compiled from, e.g. `contracts/AmoCoin.sol`.
    pub source_name: String,
    pub abi: Value,
    pub bytecode: Bytes,
    pub constructor_args: Bytes,
}

impl HardhatArtifact {
    /// Parse an artifact from its JSON content.
    pub fn from_json(content: &str) -> Result<Self, DeployError> {
        let raw: RawArtifact = serde_json::from_str(content)
            .map_err(|e| DeployError::Artifact(format!("failed to parse artifact: {}", e)))?;

        if raw.bytecode.contains("__$") {
            return Err(DeployError::Artifact(format!(
                "{} references unlinked libraries",
                raw.contract_name
            )));
        }

        let bytecode = raw.bytecode.parse::<Bytes>().map_err(|e| {
            DeployError::Artifact(format!("invalid bytecode for {}: {}", raw.contract_name, e))
        })?;

        Ok(Self {
            contract_name: raw.contract_name,
            source_name: raw.source_name,
            abi: raw.abi,
            bytecode,
            constructor_args: Bytes::new(),
        })
    }

    /// Find and load the artifact of `contract_name` under an artifacts directory.
    pub fn load(artifacts_dir: &Path, contract_name: &str) -> Result<Self, DeployError> {
        let path = find_artifact(artifacts_dir, contract_name)
            .map_err(|e| DeployError::Artifact(format!("{:#}", e)))?
            .ok_or_else(|| {
                DeployError::Artifact(format!(
                    "artifact for {} not found under {} (was the contract compiled?)",
                    contract_name,
                    artifacts_dir.display()
                ))
            })?;

        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::Artifact(format!("failed to read {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "Loaded contract artifact");
        Self::from_json(&content)
    }

    pub fn with_constructor_args(mut self, args: Bytes) -> Self {
        self.constructor_args = args;
        self
    }

    /// Fully qualified name, `contracts/AmoCoin.sol:AmoCoin`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

impl ContractSpec for HardhatArtifact {
    fn name(&self) -> &str {
        &self.contract_name
    }

    fn abi(&self) -> &Value {
        &self.abi
    }

    fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    fn constructor_args(&self) -> &Bytes {
        &self.constructor_args
    }
}

/// Walk the artifacts tree for `<Name>.sol/<Name>.json`-style files.
fn find_artifact(dir: &Path, contract_name: &str) -> Result<Option<PathBuf>> {
    let file_name = format!("{}.json", contract_name);

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name != BUILD_INFO_DIR) {
                subdirs.push(path);
            }
            continue;
        }

        let in_source_dir = path
            .parent()
            .and_then(|parent| parent.extension())
            .is_some_and(|ext| ext == "sol");
        if in_source_dir && path.file_name().is_some_and(|name| name == file_name.as_str()) {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_artifact(&subdir, contract_name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// Compiler input and version recorded by Hardhat for a compilation job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    /// Standard JSON input given to solc.
    pub input: Value,
    #[serde(default)]
    output: Value,
}

impl BuildInfo {
    /// Compiler version in the `v0.8.10+commit.fc410830` form explorers expect.
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }

    fn compiled(&self, artifact: &HardhatArtifact) -> bool {
        !self.output["contracts"][&artifact.source_name][&artifact.contract_name].is_null()
    }

    /// Find the build info that produced `artifact`.
    pub fn find(artifacts_dir: &Path, artifact: &HardhatArtifact) -> Result<Self, DeployError> {
        let dir = artifacts_dir.join(BUILD_INFO_DIR);
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            DeployError::Artifact(format!("failed to read {}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                DeployError::Artifact(format!("failed to read {}: {}", path.display(), e))
            })?;
            let info: BuildInfo = serde_json::from_str(&content).map_err(|e| {
                DeployError::Artifact(format!("failed to parse {}: {}", path.display(), e))
            })?;

            if info.compiled(artifact) {
                return Ok(info);
            }
        }

        Err(DeployError::Artifact(format!(
            "no build info under {} contains {}",
            dir.display(),
            artifact.qualified_name()
        )))
    }
}
