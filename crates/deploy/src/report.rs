//! Gas report of a confirmed deployment.

use std::fmt;

use alloy_core::primitives::utils::{self, ParseUnits, Unit};
use comfy_table::{Table, presets::UTF8_FULL};

use crate::DeploymentResult;

/// Gas usage and cost of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasReport {
    pub network: String,
    pub contract: String,
    pub gas_used: u64,
    pub gas_limit: Option<u64>,
    /// Effective gas price in wei, when the node reports it.
    pub gas_price: Option<u128>,
}

impl GasReport {
    /// Build the report from a result carrying a receipt.
    pub fn from_result(result: &DeploymentResult) -> Option<Self> {
        let receipt = result.receipt.as_ref()?;
        Some(Self {
            network: result.profile.clone(),
            contract: result.contract.clone(),
            gas_used: receipt.gas_used,
            gas_limit: result.gas_limit,
            gas_price: receipt.effective_gas_price,
        })
    }

    /// Share of the gas limit that was used, in percent.
    pub fn utilisation(&self) -> Option<f64> {
        self.gas_limit
            .filter(|limit| *limit > 0)
            .map(|limit| self.gas_used as f64 * 100.0 / limit as f64)
    }

    /// Fee paid in wei.
    pub fn fee_wei(&self) -> Option<u128> {
        self.gas_price
            .map(|price| u128::from(self.gas_used).saturating_mul(price))
    }
}

/// Render an amount of wei as a decimal amount of the native token.
pub fn format_ether(wei: u128) -> String {
    trim_decimals(utils::format_ether(wei))
}

/// Render an amount of wei in gwei with up to two decimals.
pub fn format_gwei(wei: u128) -> String {
    let gwei = ParseUnits::from(wei).format_units(Unit::GWEI);
    let truncated = match gwei.split_once('.') {
        Some((whole, decimals)) => format!("{}.{}", whole, decimals.get(..2).unwrap_or(decimals)),
        None => gwei,
    };
    trim_decimals(truncated)
}

/// `format_units` always prints every decimal of the unit.
fn trim_decimals(amount: String) -> String {
    if !amount.contains('.') {
        return amount;
    }
    amount.trim_end_matches('0').trim_end_matches('.').to_string()
}

impl fmt::Display for GasReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Contract", "Network", "Gas used", "% of limit", "Gas price (gwei)", "Fee"]);

        let utilisation = self
            .utilisation()
            .map(|pct| format!("{:.1}%", pct))
            .unwrap_or_else(|| "-".to_string());
        let price = self
            .gas_price
            .map(format_gwei)
            .unwrap_or_else(|| "-".to_string());
        let fee = self
            .fee_wei()
            .map(format_ether)
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            self.contract.clone(),
            self.network.clone(),
            self.gas_used.to_string(),
            utilisation,
            price,
            fee,
        ]);

        write!(f, "{}", table)
    }
}
