//! amo is a CLI tool to deploy a compiled contract to one of several EVM-compatible networks.

mod cli;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use amocoin_deploy::{
    BuildInfo, ConfirmationPolicy, DeployConfig, DeployError, DeploymentJournal, EtherscanVerifier,
    GasReport, HardhatArtifact, HttpConnector, HttpExecutor,
};
use cli::{Cli, Command, ContractArgs, DeployArgs, VerifyArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the deployment report.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let config = DeployConfig::load(&cli.config)?;

    match cli.command {
        Command::Deploy(args) => deploy(config, args).await,
        Command::Networks => {
            print_networks(&config);
            Ok(())
        }
        Command::Verify(args) => verify(&config, args).await,
    }
}

fn load_artifact(args: &ContractArgs) -> Result<HardhatArtifact> {
    let artifact = HardhatArtifact::load(&args.artifacts, &args.contract)?;
    Ok(match &args.constructor_args {
        Some(constructor_args) => artifact.with_constructor_args(constructor_args.clone()),
        None => artifact,
    })
}

async fn deploy(config: DeployConfig, args: DeployArgs) -> Result<()> {
    let artifact = load_artifact(&args.contract)?;

    // Resolved before the deployment so a missing API key is reported with its real cause.
    let explorer = if args.verify {
        config.explorer(&args.network)
    } else {
        Ok(None)
    };

    // Only the target network's secrets need to be present in the environment.
    let registry = config.only(&args.network).into_registry()?;

    let policy = ConfirmationPolicy {
        poll_interval: Duration::from_secs(args.poll_interval),
        timeout: args.confirmation_timeout.map(Duration::from_secs),
        ..ConfirmationPolicy::default()
    };

    let mut executor =
        HttpExecutor::new(Arc::new(registry), HttpConnector::default()).with_policy(policy);
    if !args.no_journal {
        executor = executor.with_journal(DeploymentJournal::new(&args.journal));
    }

    let result = match executor.deploy(&args.network, &artifact).await {
        Ok(result) => result,
        Err(err) => {
            if let DeployError::Confirmation { result, .. } = &err {
                tracing::error!(
                    tx_hash = ?result.transaction_hash,
                    status = %result.status,
                    "Deployment transaction was broadcast but not confirmed; check it before retrying"
                );
            } else if err.is_retryable() {
                tracing::warn!("Nothing was deployed; the command can be rerun as is");
            }
            return Err(err).context(format!("Failed to deploy {}", args.contract.contract));
        }
    };

    let address = result
        .contract_address
        .context("Confirmed deployment carries no contract address")?;

    println!("{} deployed to: {}", result.contract, address);
    if let Some(tx_hash) = result.transaction_hash {
        println!("transaction: {}", tx_hash);
    }

    if args.report_gas {
        match GasReport::from_result(&result) {
            Some(report) => println!("{}", report),
            None => tracing::warn!("No receipt data available for the gas report"),
        }
    }

    if args.verify {
        match explorer {
            Ok(Some(explorer)) => {
                let outcome = async {
                    let build_info = BuildInfo::find(&args.contract.artifacts, &artifact)?;
                    EtherscanVerifier::new(&explorer)?
                        .verify(address, &artifact, &build_info)
                        .await
                }
                .await;

                // The contract is deployed either way; verification can be rerun with `amo verify`.
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, "Source verification failed");
                }
            }
            Ok(None) => tracing::warn!(
                network = %args.network,
                "No explorer configured for this network, skipping verification"
            ),
            Err(e) => tracing::warn!(
                network = %args.network,
                error = %e,
                "Explorer settings could not be resolved, skipping verification"
            ),
        }
    }

    Ok(())
}

async fn verify(config: &DeployConfig, args: VerifyArgs) -> Result<()> {
    let explorer = config
        .explorer(&args.network)?
        .with_context(|| format!("No explorer configured for network {}", args.network))?;

    let artifact = load_artifact(&args.contract)?;
    let build_info = BuildInfo::find(&args.contract.artifacts, &artifact)?;

    let status = EtherscanVerifier::new(&explorer)?
        .verify(args.address, &artifact, &build_info)
        .await?;

    println!("{} at {}: {:?}", artifact.qualified_name(), args.address, status);
    Ok(())
}

/// Print the configured networks. Credentials are never shown.
fn print_networks(config: &DeployConfig) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Network", "RPC URL", "Chain ID", "Gas limit", "Accounts", "Headers"]);

    for (name, network) in &config.networks {
        let mut headers: Vec<&str> = network.http_headers.keys().map(String::as_str).collect();
        if network.auth.is_some() {
            headers.insert(0, "Authorization");
        }

        table.add_row(vec![
            name.clone(),
            network.url.clone(),
            network
                .chain_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            network
                .gas_limit
                .map(|gas| gas.to_string())
                .unwrap_or_else(|| "-".to_string()),
            network.accounts.len().to_string(),
            headers.join(", "),
        ]);
    }

    println!("{}", table);
}
