//! The deployment executor: resolve → connect → submit → confirm → report.

use std::{sync::Arc, time::Duration};

use alloy_core::primitives::{Address, B256};
use chrono::Utc;

use crate::{
    ContractSpec, DeployError, DeploymentJournal, JournalEntry, NetworkProfile, ProfileRegistry,
    rpc::{ChainClient, ChainConnector, RpcError, TransactionReceipt},
    signer::{CreationTransaction, DeploySigner},
};

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of consecutive polls a transaction may be unknown to the node.
const DEFAULT_DROPPED_AFTER: u32 = 30;

/// Lifecycle of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DeploymentStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Outcome of one executor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub profile: String,
    pub contract: String,
    /// Account paying for the deployment.
    pub deployer: Address,
    pub status: DeploymentStatus,
    /// Set once the node accepted the transaction, whatever happens next.
    pub transaction_hash: Option<B256>,
    /// Set only when confirmed.
    pub contract_address: Option<Address>,
    /// Gas limit the transaction was sent with.
    pub gas_limit: Option<u64>,
    pub receipt: Option<TransactionReceipt>,
}

impl DeploymentResult {
    fn pending(profile: &str, contract: &str, deployer: Address) -> Self {
        Self {
            profile: profile.to_string(),
            contract: contract.to_string(),
            deployer,
            status: DeploymentStatus::Pending,
            transaction_hash: None,
            contract_address: None,
            gas_limit: None,
            receipt: None,
        }
    }

    fn confirm(&mut self, receipt: TransactionReceipt) -> Result<(), String> {
        debug_assert_eq!(self.status, DeploymentStatus::Pending);

        let Some(address) = receipt.contract_address else {
            self.fail(Some(receipt));
            return Err("receipt carries no contract address".to_string());
        };

        self.status = DeploymentStatus::Confirmed;
        self.contract_address = Some(address);
        self.receipt = Some(receipt);
        Ok(())
    }

    fn fail(&mut self, receipt: Option<TransactionReceipt>) {
        debug_assert_eq!(self.status, DeploymentStatus::Pending);
        self.status = DeploymentStatus::Failed;
        self.receipt = receipt;
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == DeploymentStatus::Confirmed
    }

    fn into_confirmation_error(self, reason: impl Into<String>) -> DeployError {
        DeployError::Confirmation {
            reason: reason.into(),
            result: Box::new(self),
        }
    }
}

/// How the executor waits for a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    /// Consecutive polls during which the node does not know the transaction
    /// (or cannot be reached) before giving up.
    pub dropped_after: u32,
    /// Overall wait limit. `None` waits until the transaction is mined or dropped.
    pub timeout: Option<Duration>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            dropped_after: DEFAULT_DROPPED_AFTER,
            timeout: None,
        }
    }
}

/// Terminal states of the receipt poll loop.
enum Wait {
    Mined(TransactionReceipt),
    Dropped,
    Unreachable(RpcError),
}

/// Runs deployments against profiles of a shared registry.
///
/// A run is strictly sequential and never retries: any failure surfaces to the
/// caller, who decides whether to try again.
#[derive(Debug, Clone)]
pub struct Executor<C> {
    registry: Arc<ProfileRegistry>,
    connector: C,
    policy: ConfirmationPolicy,
    journal: Option<DeploymentJournal>,
}

impl<C: ChainConnector> Executor<C> {
    pub fn new(registry: Arc<ProfileRegistry>, connector: C) -> Self {
        Self {
            registry,
            connector,
            policy: ConfirmationPolicy::default(),
            journal: None,
        }
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record submitted transactions so an interrupted run can be resumed.
    pub fn with_journal(mut self, journal: DeploymentJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Deploy `contract` to the network named `profile_name`.
    pub async fn deploy<S>(
        &self,
        profile_name: &str,
        contract: &S,
    ) -> Result<DeploymentResult, DeployError>
    where
        S: ContractSpec + ?Sized,
    {
        let profile = self.registry.resolve(profile_name)?;
        contract.validate()?;

        tracing::info!(
            network = %profile.name,
            rpc_url = %profile.rpc_url,
            contract = %contract.name(),
            "Starting deployment..."
        );

        let client = self
            .connector
            .connect(profile)
            .map_err(|e| DeployError::connection(&profile.name, e))?;

        let chain_id = self.check_chain_id(&client, profile).await?;

        let key = profile
            .deployer_key()
            .ok_or_else(|| DeployError::invalid_profile(&profile.name, "no accounts"))?;
        let signer = DeploySigner::from_key(key)
            .map_err(|reason| DeployError::invalid_profile(&profile.name, reason))?;

        tracing::debug!(deployer = %signer.address(), chain_id, "Bound signer");

        if let Some(result) = self
            .resume_from_journal(&client, profile, contract, signer.address())
            .await?
        {
            return Ok(result);
        }

        let result = self
            .submit(&client, profile, contract, &signer, chain_id)
            .await?;

        let result = self.await_confirmation(&client, result).await?;

        tracing::info!(
            network = %result.profile,
            contract = %result.contract,
            address = ?result.contract_address,
            tx_hash = ?result.transaction_hash,
            "✓ Contract deployed"
        );

        Ok(result)
    }

    /// Query the live chain id and compare it with the profile's declared one.
    async fn check_chain_id(
        &self,
        client: &C::Client,
        profile: &NetworkProfile,
    ) -> Result<u64, DeployError> {
        let actual = client
            .chain_id()
            .await
            .map_err(|e| DeployError::connection(&profile.name, e))?;

        match profile.chain_id {
            Some(expected) if expected != actual => Err(DeployError::ChainMismatch {
                profile: profile.name.clone(),
                expected,
                actual,
            }),
            _ => Ok(actual),
        }
    }

    /// Look up a transaction journaled by an earlier run before sending a new one.
    ///
    /// Returns the confirmed result when the earlier deployment landed.
    async fn resume_from_journal<S>(
        &self,
        client: &C::Client,
        profile: &NetworkProfile,
        contract: &S,
        deployer: Address,
    ) -> Result<Option<DeploymentResult>, DeployError>
    where
        S: ContractSpec + ?Sized,
    {
        let Some(journal) = &self.journal else {
            return Ok(None);
        };

        let Some(entry) = journal
            .load(&profile.name, contract.name())
            .map_err(|e| DeployError::Journal(format!("{:#}", e)))?
        else {
            return Ok(None);
        };

        if entry.bytecode_hash != contract.bytecode_hash() || entry.deployer != deployer {
            tracing::warn!(
                tx_hash = %entry.transaction_hash,
                "Journaled deployment was made with other bytecode or account, ignoring it"
            );
            self.clear_journal(&profile.name, contract.name());
            return Ok(None);
        }

        let hash = entry.transaction_hash;
        tracing::info!(tx_hash = %hash, "Checking previously submitted deployment...");

        let mut result = DeploymentResult::pending(&profile.name, contract.name(), deployer);
        result.transaction_hash = Some(hash);

        let receipt = client
            .transaction_receipt(hash)
            .await
            .map_err(|e| DeployError::connection(&profile.name, e))?;

        match receipt {
            Some(receipt) if receipt.succeeded() => {
                let confirmed = result.confirm(receipt);
                self.clear_journal(&profile.name, contract.name());
                confirmed.map_err(|reason| result.clone().into_confirmation_error(reason))?;

                tracing::info!(
                    address = ?result.contract_address,
                    tx_hash = %hash,
                    "Previous deployment already confirmed, not resubmitting"
                );
                Ok(Some(result))
            }
            Some(_) => {
                tracing::warn!(tx_hash = %hash, "Previous deployment reverted, deploying again");
                self.clear_journal(&profile.name, contract.name());
                Ok(None)
            }
            None => {
                let known = client
                    .transaction_known(hash)
                    .await
                    .map_err(|e| DeployError::connection(&profile.name, e))?;

                if known {
                    Err(result.into_confirmation_error(format!(
                        "previous deployment transaction {} is still pending",
                        hash
                    )))
                } else {
                    tracing::warn!(tx_hash = %hash, "Previous deployment was dropped, deploying again");
                    self.clear_journal(&profile.name, contract.name());
                    Ok(None)
                }
            }
        }
    }

    /// Build, sign and broadcast the contract-creation transaction.
    async fn submit<S>(
        &self,
        client: &C::Client,
        profile: &NetworkProfile,
        contract: &S,
        signer: &DeploySigner,
        chain_id: u64,
    ) -> Result<DeploymentResult, DeployError>
    where
        S: ContractSpec + ?Sized,
    {
        let deployer = signer.address();

        let nonce = client
            .transaction_count(deployer)
            .await
            .map_err(|e| DeployError::connection(&profile.name, e))?;
        let gas_price = client
            .gas_price()
            .await
            .map_err(|e| DeployError::connection(&profile.name, e))?;

        let input = contract.init_code();

        let gas_limit = match profile.gas_limit {
            Some(limit) => limit,
            None => client
                .estimate_gas(deployer, &input)
                .await
                .map_err(|e| DeployError::Submission(format!("gas estimation failed: {}", e)))?,
        };

        let tx = CreationTransaction {
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            input,
        };
        let signed = signer.sign(&tx).map_err(DeployError::Submission)?;

        let tx_hash = client
            .send_raw_transaction(&signed.raw)
            .await
            .map_err(|e| DeployError::Submission(e.to_string()))?;

        if tx_hash != signed.hash {
            tracing::warn!(
                local = %signed.hash,
                node = %tx_hash,
                "Node reported a different transaction hash than computed locally"
            );
        }

        tracing::info!(
            tx_hash = %tx_hash,
            nonce,
            gas_limit,
            gas_price,
            expected_address = %signer.contract_address(nonce),
            "Deployment transaction submitted"
        );

        let mut result = DeploymentResult::pending(&profile.name, contract.name(), deployer);
        result.transaction_hash = Some(tx_hash);
        result.gas_limit = Some(gas_limit);

        if let Some(journal) = &self.journal {
            let entry = JournalEntry {
                profile: profile.name.clone(),
                contract: contract.name().to_string(),
                transaction_hash: tx_hash,
                deployer,
                nonce,
                bytecode_hash: contract.bytecode_hash(),
                submitted_at: Utc::now(),
            };
            // The transaction is already out; keep waiting for it even if the record fails.
            if let Err(e) = journal.record(&entry) {
                tracing::warn!(err = ?e, tx_hash = %tx_hash, "Failed to journal deployment transaction");
            }
        }

        Ok(result)
    }

    /// Wait until the submitted transaction is mined, dropped or the policy gives up.
    async fn await_confirmation(
        &self,
        client: &C::Client,
        mut result: DeploymentResult,
    ) -> Result<DeploymentResult, DeployError> {
        let Some(hash) = result.transaction_hash else {
            return Err(result.into_confirmation_error("no transaction was submitted"));
        };

        tracing::info!(tx_hash = %hash, "Waiting for confirmation...");

        let wait = self.poll_receipt(client, hash);
        let outcome = match self.policy.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(result.into_confirmation_error(format!(
                        "timed out after {}s waiting for {}",
                        timeout.as_secs(),
                        hash
                    )));
                }
            },
            None => wait.await,
        };

        match outcome {
            Wait::Mined(receipt) if receipt.succeeded() => {
                let block = receipt.block_number;
                let confirmed = result.confirm(receipt);
                self.clear_journal(&result.profile, &result.contract);
                confirmed.map_err(|reason| result.clone().into_confirmation_error(reason))?;

                tracing::debug!(tx_hash = %hash, block = ?block, "Deployment confirmed");
                Ok(result)
            }
            Wait::Mined(receipt) => {
                let reason = match receipt.block_number {
                    Some(block) => format!("deployment reverted in block {}", block),
                    None => "deployment reverted".to_string(),
                };
                result.fail(Some(receipt));
                self.clear_journal(&result.profile, &result.contract);
                Err(result.into_confirmation_error(reason))
            }
            Wait::Dropped => {
                result.fail(None);
                self.clear_journal(&result.profile, &result.contract);
                Err(result.into_confirmation_error(format!(
                    "transaction {} was dropped by the node",
                    hash
                )))
            }
            Wait::Unreachable(e) => Err(result.into_confirmation_error(format!(
                "lost contact with the node while waiting for {}: {}",
                hash, e
            ))),
        }
    }

    async fn poll_receipt(&self, client: &C::Client, hash: B256) -> Wait {
        let mut misses = 0u32;

        loop {
            match client.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Wait::Mined(receipt),
                Ok(None) => match client.transaction_known(hash).await {
                    Ok(true) => misses = 0,
                    Ok(false) => {
                        misses += 1;
                        tracing::debug!(tx_hash = %hash, misses, "Transaction unknown to the node");
                        if misses >= self.policy.dropped_after {
                            return Wait::Dropped;
                        }
                    }
                    Err(e) => {
                        misses += 1;
                        tracing::trace!(error = %e, "Transaction lookup failed, retrying...");
                        if misses >= self.policy.dropped_after {
                            return Wait::Unreachable(e);
                        }
                    }
                },
                Err(e) => {
                    misses += 1;
                    tracing::trace!(error = %e, "Receipt lookup failed, retrying...");
                    if misses >= self.policy.dropped_after {
                        return Wait::Unreachable(e);
                    }
                }
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    fn clear_journal(&self, profile: &str, contract: &str) {
        let Some(journal) = &self.journal else {
            return;
        };

        if let Err(e) = journal.clear(profile, contract) {
            tracing::warn!(err = ?e, "Failed to clear journal entry");
        }
    }
}
