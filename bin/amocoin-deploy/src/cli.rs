use std::path::PathBuf;

use alloy_core::primitives::{Address, Bytes};
use amocoin_deploy::{CONFIG_FILENAME, DEFAULT_JOURNAL_DIR};
use clap::{ArgAction, Args, Parser, Subcommand, builder::FalseyValueParser};
use tracing::level_filters::LevelFilter;

/// The contract deployed when none is named.
const DEFAULT_CONTRACT: &str = "AmoCoin";

/// The default Hardhat artifacts directory.
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

#[derive(Parser)]
#[command(name = "amo")]
#[command(
    author,
    version,
    about = "Deploy compiled contracts to EVM-compatible networks"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "AMO_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the network configuration file.
    ///
    /// Every value can also be set from the environment, e.g. `AMO_NETWORKS__BAOBAB__URL`.
    #[arg(short, long, global = true, alias = "conf", env = "AMO_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a contract to a configured network.
    Deploy(DeployArgs),
    /// List the configured networks.
    Networks,
    /// Verify the source of a deployed contract on the network's block explorer.
    Verify(VerifyArgs),
}

/// Where to find the compiled contract.
#[derive(Debug, Clone, Args)]
pub struct ContractArgs {
    /// The contract name, as in its Hardhat artifact.
    #[arg(long, env = "AMO_CONTRACT", default_value = DEFAULT_CONTRACT)]
    pub contract: String,

    /// The Hardhat artifacts directory.
    #[arg(long, env = "AMO_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// ABI-encoded constructor arguments (hex).
    #[arg(long, env = "AMO_CONSTRUCTOR_ARGS", value_parser = parse_hex_bytes)]
    pub constructor_args: Option<Bytes>,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// The network to deploy to.
    #[arg(short, long, env = "AMO_NETWORK")]
    pub network: String,

    #[clap(flatten)]
    pub contract: ContractArgs,

    /// Give up waiting for the confirmation after this many seconds.
    ///
    /// The transaction may still be mined afterwards; the next run picks it up
    /// from the journal instead of deploying twice.
    #[arg(long, env = "AMO_CONFIRMATION_TIMEOUT")]
    pub confirmation_timeout: Option<u64>,

    /// Seconds between receipt polls.
    #[arg(long, env = "AMO_POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Directory where submitted transactions are journaled.
    #[arg(long, env = "AMO_JOURNAL", default_value = DEFAULT_JOURNAL_DIR)]
    pub journal: PathBuf,

    /// Do not journal submitted transactions.
    #[arg(long, env = "AMO_NO_JOURNAL", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub no_journal: bool,

    /// Print a gas report for the deployment.
    #[arg(long, env = "REPORT_GAS", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub report_gas: bool,

    /// Verify the contract source on the network's explorer once deployed.
    #[arg(long, env = "AMO_VERIFY", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub verify: bool,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// The network the contract lives on.
    #[arg(short, long, env = "AMO_NETWORK")]
    pub network: String,

    /// Address of the deployed contract.
    #[arg(long)]
    pub address: Address,

    #[clap(flatten)]
    pub contract: ContractArgs,
}

fn parse_hex_bytes(value: &str) -> Result<Bytes, String> {
    value
        .parse::<Bytes>()
        .map_err(|e| format!("invalid hex '{}': {}", value, e))
}
