//! amocoin-deploy - Contract deployment library for EVM-compatible networks.
//!
//! This crate resolves a named network profile, signs a contract-creation
//! transaction with the profile's first account, broadcasts it, and waits for
//! the contract address to be confirmed on chain.

mod artifact;
pub use artifact::{BuildInfo, ContractSpec, HardhatArtifact};

mod config;
pub use config::{
    BasicAuthConfig, CONFIG_FILENAME, DeployConfig, ENV_PREFIX, ExplorerConfig, NetworkConfig,
};

mod error;
pub use error::DeployError;

mod executor;
pub use executor::{ConfirmationPolicy, DeploymentResult, DeploymentStatus, Executor};

mod journal;
pub use journal::{DEFAULT_JOURNAL_DIR, DeploymentJournal, JournalEntry};

mod profile;
pub use profile::{AccountKey, AuthHeaders, NetworkProfile};

mod registry;
pub use registry::ProfileRegistry;

pub mod report;
pub use report::GasReport;

pub mod rpc;
pub use rpc::{ChainClient, ChainConnector, HttpChainClient, HttpConnector, RpcError};

pub mod signer;

mod verify;
pub use verify::{EtherscanVerifier, VerificationStatus};

/// Executor talking to nodes over HTTP JSON-RPC.
pub type HttpExecutor = Executor<HttpConnector>;
