//! Configuration surface: network profiles loaded from `Amo.toml` and the environment.
//!
//! Credentials are expected as `env:VAR` references so that versioned config
//! files never carry secrets. Every field can also be overridden from the
//! environment with the `AMO_` prefix, e.g. `AMO_NETWORKS__BAOBAB__URL`.

use std::{collections::BTreeMap, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{AccountKey, AuthHeaders, DeployError, NetworkProfile, ProfileRegistry};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Amo.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "AMO_";

/// Prefix marking a value that must be read from the environment.
const ENV_REF_PREFIX: &str = "env:";

/// HTTP basic credentials for a gated RPC gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Block explorer used for source verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Etherscan-compatible API endpoint.
    pub api_url: String,
    /// API key, usually an `env:` reference.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// One `[networks.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    /// Private keys or `env:` references to them.
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default, alias = "gas")]
    pub gas_limit: Option<u64>,
    /// Static headers added to every RPC request. Values may be `env:` references.
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    /// Basic auth credentials, rendered as an `Authorization` header.
    #[serde(default)]
    pub auth: Option<BasicAuthConfig>,
    #[serde(default)]
    pub explorer: Option<ExplorerConfig>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl DeployConfig {
    /// Load the configuration from a TOML file merged with `AMO_` environment overrides.
    ///
    /// A missing file is not an error: networks may come from the environment alone.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        if path.exists() {
            tracing::info!(path = %path.display(), "Loading configuration");
        } else {
            tracing::warn!(
                path = %path.display(),
                "Configuration file not found, reading networks from the environment only"
            );
        }

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Parse a configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self, DeployError> {
        Self::from_figment(Figment::from(Toml::string(content)))
    }

    fn from_figment(figment: Figment) -> Result<Self, DeployError> {
        figment
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }

    /// Keep only the named network. Unknown names leave the configuration empty.
    pub fn only(mut self, network: &str) -> Self {
        self.networks.retain(|name, _| name == network);
        self
    }

    /// Resolve secrets from the process environment and register every network.
    pub fn into_registry(self) -> Result<ProfileRegistry, DeployError> {
        self.into_registry_with(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::into_registry`] with a custom variable lookup.
    pub fn into_registry_with<F>(self, lookup: F) -> Result<ProfileRegistry, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = ProfileRegistry::new();

        for (name, network) in self.networks {
            let profile = network.into_profile(&name, &lookup)?;
            registry.register(profile)?;
        }

        Ok(registry)
    }

    /// The explorer settings of a network, with the API key resolved.
    pub fn explorer(&self, network: &str) -> Result<Option<ExplorerConfig>, DeployError> {
        let Some(config) = self.networks.get(network) else {
            return Err(DeployError::UnknownProfile(network.to_string()));
        };

        let Some(explorer) = &config.explorer else {
            return Ok(None);
        };

        let lookup = |name: &str| std::env::var(name).ok();
        let api_key = explorer
            .api_key
            .as_deref()
            .map(|key| resolve_secret(key, &lookup).map(|(value, _)| value))
            .transpose()?;

        Ok(Some(ExplorerConfig {
            api_url: explorer.api_url.clone(),
            api_key,
        }))
    }
}

impl NetworkConfig {
    fn into_profile<F>(self, name: &str, lookup: &F) -> Result<NetworkProfile, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut accounts = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let (key, literal) = resolve_secret(account, lookup)?;
            if literal {
                tracing::warn!(
                    network = %name,
                    "Account key is written literally in the configuration, prefer an env: reference"
                );
            }
            accounts.push(AccountKey::new(key));
        }

        let mut headers = match &self.auth {
            Some(auth) => {
                let (id, _) = resolve_secret(&auth.access_key_id, lookup)?;
                let (secret, _) = resolve_secret(&auth.secret_access_key, lookup)?;
                AuthHeaders::basic(&id, &secret)
            }
            None => AuthHeaders::new(),
        };

        for (header, value) in &self.http_headers {
            let (value, _) = resolve_secret(value, lookup)?;
            headers.insert(header.clone(), value);
        }

        let mut profile = NetworkProfile::new(name, self.url, accounts);
        profile.chain_id = self.chain_id;
        profile.gas_limit = self.gas_limit;
        if !headers.is_empty() {
            profile.auth_headers = Some(headers);
        }

        Ok(profile)
    }
}

/// Resolve an `env:VAR` reference. Returns the value and whether it was a literal.
fn resolve_secret<F>(value: &str, lookup: &F) -> Result<(String, bool), DeployError>
where
    F: Fn(&str) -> Option<String>,
{
    match value.strip_prefix(ENV_REF_PREFIX) {
        Some(var) => {
            let var = var.trim();
            lookup(var)
                .map(|resolved| (resolved, false))
                .ok_or_else(|| {
                    DeployError::Config(format!("environment variable '{}' is not set", var))
                })
        }
        None => Ok((value.to_string(), true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    const SAMPLE: &str = r#"
        [networks.baobab]
        url = "https://api.baobab.klaytn.net:8651"
        accounts = ["env:BAOBAB_DEPLOYER_KEY"]
        chain_id = 1001
        gas = 8500000

        [networks.baobab.auth]
        access_key_id = "env:KAS_ACCESS_KEY_ID"
        secret_access_key = "env:KAS_SECRET_ACCESS_KEY"

        [networks.baobab.http_headers]
        x-chain-id = "1001"

        [networks.baobab.explorer]
        api_url = "https://api-baobab.klaytnscope.com/api"
        api_key = "env:EXPLORER_API_KEY"

        [networks.local]
        url = "http://localhost:8545"
        accounts = ["env:LOCAL_KEY"]
    "#;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "BAOBAB_DEPLOYER_KEY" | "LOCAL_KEY" => Some(KEY.to_string()),
            "KAS_ACCESS_KEY_ID" => Some("id".to_string()),
            "KAS_SECRET_ACCESS_KEY" => Some("secret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_parse_sample() {
        let config = DeployConfig::from_toml_str(SAMPLE).unwrap();
        let baobab = &config.networks["baobab"];
        assert_eq!(baobab.chain_id, Some(1001));
        assert_eq!(baobab.gas_limit, Some(8_500_000));
        assert_eq!(baobab.accounts, vec!["env:BAOBAB_DEPLOYER_KEY"]);
        assert!(baobab.explorer.is_some());
    }

    #[test]
    fn test_registry_resolves_env_references() {
        let registry = DeployConfig::from_toml_str(SAMPLE)
            .unwrap()
            .into_registry_with(lookup)
            .unwrap();

        let baobab = registry.resolve("baobab").unwrap();
        assert_eq!(baobab.accounts, vec![AccountKey::new(KEY)]);
        assert_eq!(baobab.chain_id, Some(1001));

        let headers: BTreeMap<_, _> = baobab.auth_headers.as_ref().unwrap().iter().collect();
        assert_eq!(headers["Authorization"], "Basic aWQ6c2VjcmV0");
        assert_eq!(headers["x-chain-id"], "1001");

        let local = registry.resolve("local").unwrap();
        assert!(local.auth_headers.is_none());
        assert!(local.gas_limit.is_none());
    }

    #[test]
    fn test_missing_env_reference_fails() {
        let err = DeployConfig::from_toml_str(SAMPLE)
            .unwrap()
            .into_registry_with(|_| None)
            .unwrap_err();
        assert!(matches!(err, DeployError::Config(ref msg) if msg.contains("is not set")));
    }

    #[test]
    fn test_only_skips_other_networks_secrets() {
        let registry = DeployConfig::from_toml_str(SAMPLE)
            .unwrap()
            .only("local")
            .into_registry_with(|name| (name == "LOCAL_KEY").then(|| KEY.to_string()))
            .unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["local"]);
        assert!(matches!(
            registry.resolve("baobab"),
            Err(DeployError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_template_account_is_rejected() {
        let config = DeployConfig::from_toml_str(
            r#"
            [networks.klaytn]
            url = "https://api.baobab.klaytn.net:8651"
            accounts = ["YOUR_ACCOUNT"]
            "#,
        )
        .unwrap();

        let err = config.into_registry_with(|_| None).unwrap_err();
        assert!(matches!(err, DeployError::InvalidProfile { .. }));
    }

    #[test]
    fn test_explorer_with_unset_key_is_config_error() {
        let config = DeployConfig::from_toml_str(
            r#"
            [networks.baobab]
            url = "https://api.baobab.klaytn.net:8651"

            [networks.baobab.explorer]
            api_url = "https://api-baobab.klaytnscope.com/api"
            api_key = "env:AMO_TEST_EXPLORER_KEY_NEVER_SET"
            "#,
        )
        .unwrap();

        let err = config.explorer("baobab").unwrap_err();
        assert!(matches!(err, DeployError::Config(ref msg) if msg.contains("is not set")));
        assert!(matches!(
            config.explorer("cypress"),
            Err(DeployError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_bundled_sample_config_parses() {
        let config = DeployConfig::from_toml_str(include_str!("../../../Amo.toml")).unwrap();

        assert_eq!(
            config.networks.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["baobab", "cypress", "klaytn", "local"]
        );
        assert_eq!(config.networks["klaytn"].url, "https://api.baobab.klaytn.net:8651");
        assert!(config.networks["klaytn"].auth.is_none());
        assert_eq!(
            config.networks["cypress"].url,
            "https://public-node-api.klaytnapi.com/v1/cypress"
        );
        assert_eq!(config.networks["cypress"].chain_id, Some(8217));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = DeployConfig::from_toml_str("[networks.local]\nchain_id = 1").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }
}
