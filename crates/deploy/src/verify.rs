//! Source verification on an Etherscan-compatible block explorer.

use std::time::Duration;

use alloy_core::primitives::Address;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use url::Url;

use crate::{BuildInfo, ContractSpec, DeployError, ExplorerConfig, HardhatArtifact};

/// Default interval between verification status checks.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of status checks before giving up.
const DEFAULT_MAX_POLLS: usize = 24;

/// Generic explorer API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

/// State reported by the explorer for a verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    AlreadyVerified,
}

/// Interpretation of a `checkverifystatus` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StatusCheck {
    Done(VerificationStatus),
    Pending,
    Failed(String),
}

fn is_already_verified(text: &str) -> bool {
    text.to_lowercase().contains("already verified")
}

fn classify_status(response: &ApiResponse) -> StatusCheck {
    let result = response.result.as_str();

    if is_already_verified(result) {
        return StatusCheck::Done(VerificationStatus::AlreadyVerified);
    }

    if result.starts_with("Pass") {
        return StatusCheck::Done(VerificationStatus::Verified);
    }

    if result.to_lowercase().contains("pending") {
        return StatusCheck::Pending;
    }

    StatusCheck::Failed(format!("{} ({})", result, response.message))
}

/// Submits sources and polls for the verdict.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: Option<String>,
    poll_interval: Duration,
    max_polls: usize,
}

impl EtherscanVerifier {
    pub fn new(config: &ExplorerConfig) -> Result<Self, DeployError> {
        let api_url = Url::parse(&config.api_url).map_err(|e| {
            DeployError::Verification(format!("invalid explorer url '{}': {}", config.api_url, e))
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_url,
            api_key: config.api_key.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    /// Form fields of a `verifysourcecode` request.
    fn submission_form(
        &self,
        address: Address,
        artifact: &HardhatArtifact,
        build_info: &BuildInfo,
    ) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", address.to_string()),
            ("sourceCode", build_info.input.to_string()),
            ("codeformat", "solidity-standard-json-input".to_string()),
            ("contractname", artifact.qualified_name()),
            ("compilerversion", build_info.compiler_version()),
            // Field name as spelled by the Etherscan API.
            (
                "constructorArguements",
                hex::encode(artifact.constructor_args()),
            ),
        ];
        if let Some(key) = &self.api_key {
            form.push(("apikey", key.clone()));
        }
        form
    }

    /// Submit the contract sources for `address` and wait for the verdict.
    pub async fn verify(
        &self,
        address: Address,
        artifact: &HardhatArtifact,
        build_info: &BuildInfo,
    ) -> Result<VerificationStatus, DeployError> {
        tracing::info!(
            address = %address,
            contract = %artifact.qualified_name(),
            compiler = %build_info.compiler_version(),
            "Submitting source for verification..."
        );

        let response: ApiResponse = self
            .client
            .post(self.api_url.clone())
            .form(&self.submission_form(address, artifact, build_info))
            .send()
            .await
            .map_err(|e| DeployError::Verification(format!("submission failed: {}", e)))?
            .json()
            .await
            .map_err(|e| DeployError::Verification(format!("invalid explorer response: {}", e)))?;

        if response.status != "1" {
            if is_already_verified(&response.result) {
                tracing::info!(address = %address, "Contract source already verified");
                return Ok(VerificationStatus::AlreadyVerified);
            }
            return Err(DeployError::Verification(format!(
                "explorer rejected submission: {}",
                response.result
            )));
        }

        let guid = response.result;
        tracing::debug!(guid = %guid, "Verification request accepted");

        let status = (|| async { self.check_status(&guid).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_polls),
            )
            .when(|check: &StatusCheck| *check == StatusCheck::Pending)
            .notify(|_, delay| {
                tracing::debug!(guid = %guid, delay = ?delay, "Verification pending, checking again");
            })
            .await;

        match status {
            Ok(status) => {
                tracing::info!(address = %address, status = ?status, "✓ Contract source verified");
                Ok(status)
            }
            Err(StatusCheck::Pending) => Err(DeployError::Verification(format!(
                "still pending after {} checks (guid {})",
                self.max_polls, guid
            ))),
            Err(StatusCheck::Failed(reason)) => Err(DeployError::Verification(reason)),
            Err(StatusCheck::Done(status)) => Ok(status),
        }
    }

    async fn check_status(&self, guid: &str) -> Result<VerificationStatus, StatusCheck> {
        let mut query = vec![
            ("module", "contract"),
            ("action", "checkverifystatus"),
            ("guid", guid),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }

        let response: ApiResponse = self
            .client
            .get(self.api_url.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| StatusCheck::Failed(format!("status check failed: {}", e)))?
            .json()
            .await
            .map_err(|e| StatusCheck::Failed(format!("invalid explorer response: {}", e)))?;

        match classify_status(&response) {
            StatusCheck::Done(status) => Ok(status),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str, result: &str) -> ApiResponse {
        ApiResponse {
            status: status.to_string(),
            message: "OK".to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(&response("1", "Pass - Verified")),
            StatusCheck::Done(VerificationStatus::Verified)
        );
        assert_eq!(
            classify_status(&response("0", "Pending in queue")),
            StatusCheck::Pending
        );
        assert_eq!(
            classify_status(&response("1", "Already Verified")),
            StatusCheck::Done(VerificationStatus::AlreadyVerified)
        );
        assert!(matches!(
            classify_status(&response("0", "Fail - Unable to verify")),
            StatusCheck::Failed(_)
        ));
    }

    #[test]
    fn test_submission_form() {
        let artifact = HardhatArtifact::from_json(
            r#"{
                "contractName": "AmoCoin",
                "sourceName": "contracts/AmoCoin.sol",
                "abi": [],
                "bytecode": "0x6080"
            }"#,
        )
        .unwrap();
        let build_info: BuildInfo = serde_json::from_str(
            r#"{"solcLongVersion": "0.8.10+commit.fc410830", "input": {"language": "Solidity"}}"#,
        )
        .unwrap();

        let verifier = EtherscanVerifier::new(&ExplorerConfig {
            api_url: "https://api-baobab.klaytnscope.com/api".to_string(),
            api_key: Some("KEY".to_string()),
        })
        .unwrap();

        let form = verifier.submission_form(Address::ZERO, &artifact, &build_info);
        let field = |name: &str| {
            form.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
        };

        assert_eq!(field("contractname").as_deref(), Some("contracts/AmoCoin.sol:AmoCoin"));
        assert_eq!(field("compilerversion").as_deref(), Some("v0.8.10+commit.fc410830"));
        assert_eq!(field("constructorArguements").as_deref(), Some(""));
        assert_eq!(field("apikey").as_deref(), Some("KEY"));
        assert!(field("sourceCode").unwrap().contains("Solidity"));
    }

    #[test]
    fn test_invalid_explorer_url() {
        let err = EtherscanVerifier::new(&ExplorerConfig {
            api_url: "nope".to_string(),
            api_key: None,
        })
        .unwrap_err();
        assert!(matches!(err, DeployError::Verification(_)));
    }
}
