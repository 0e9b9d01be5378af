//! Error taxonomy for profile configuration and deployment runs.

use alloy_core::primitives::B256;

use crate::DeploymentResult;

/// Errors surfaced by the registry and the deployment executor.
///
/// Configuration-time kinds (`InvalidProfile`, `DuplicateProfile`,
/// `UnknownProfile`, `Config`, `Artifact`) never touch the network and are not
/// retryable without fixing the input. The remaining kinds come from the chain.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid network profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("network profile '{0}' is already registered")]
    DuplicateProfile(String),

    #[error("unknown network profile '{0}'")]
    UnknownProfile(String),

    #[error("failed to load configuration: {0}")]
    Config(String),

    #[error("invalid contract artifact: {0}")]
    Artifact(String),

    #[error("connection to '{profile}' failed: {reason}")]
    Connection { profile: String, reason: String },

    #[error("network '{profile}' reports chain id {actual}, profile expects {expected}")]
    ChainMismatch {
        profile: String,
        expected: u64,
        actual: u64,
    },

    #[error("deployment transaction rejected: {0}")]
    Submission(String),

    #[error("deployment not confirmed: {reason}")]
    Confirmation {
        reason: String,
        result: Box<DeploymentResult>,
    },

    #[error("deployment journal error: {0}")]
    Journal(String),

    #[error("source verification failed: {0}")]
    Verification(String),
}

/// Node messages that usually clear up on their own or after re-reading chain state.
const TRANSIENT_SUBMISSION_CAUSES: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "replacement transaction underpriced",
    "transaction underpriced",
    "already known",
    "txpool is full",
];

impl DeployError {
    /// Whether a caller may retry the run as-is.
    ///
    /// A confirmation error is never reported as retryable: the transaction may
    /// still land and the chain must be re-queried first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Submission(reason) => {
                let reason = reason.to_lowercase();
                TRANSIENT_SUBMISSION_CAUSES
                    .iter()
                    .any(|cause| reason.contains(cause))
            }
            _ => false,
        }
    }

    /// The transaction hash a failed run already broadcast, if any.
    pub fn transaction_hash(&self) -> Option<B256> {
        match self {
            Self::Confirmation { result, .. } => result.transaction_hash,
            _ => None,
        }
    }

    pub(crate) fn invalid_profile(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn connection(profile: &str, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            profile: profile.to_string(),
            reason: reason.to_string(),
        }
    }
}
