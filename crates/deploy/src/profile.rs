//! Network profiles: where a contract is deployed and with which credentials.

use std::{collections::BTreeMap, fmt, str::FromStr};

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

/// A signing credential: a hex-encoded secp256k1 private key.
///
/// The key never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey(String);

impl AccountKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    /// Check that the key is a usable private key and not a template value.
    pub fn validate(&self) -> Result<(), String> {
        let raw = self.0.strip_prefix("0x").unwrap_or(&self.0);

        if raw.is_empty() {
            return Err("account key is empty".to_string());
        }

        if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            if raw.chars().any(|c| c.is_ascii_alphabetic() && !c.is_ascii_hexdigit()) {
                return Err(format!(
                    "account '{}' looks like a placeholder, not a private key",
                    redact(&self.0)
                ));
            }
            return Err("account key contains non-hex characters".to_string());
        }

        if raw.len() != 64 {
            return Err(format!(
                "account key must be 32 bytes (64 hex chars), got {} chars",
                raw.len()
            ));
        }

        self.signer().map(|_| ())
    }

    /// Build a local signer from this key.
    pub fn signer(&self) -> Result<PrivateKeySigner, String> {
        PrivateKeySigner::from_str(&self.0)
            .map_err(|e| format!("invalid secp256k1 private key: {}", e))
    }

    /// The address controlled by this key.
    pub fn address(&self) -> Result<Address, String> {
        self.signer().map(|signer| signer.address())
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountKey").field(&"<redacted>").finish()
    }
}

fn redact(value: &str) -> String {
    // Placeholders are short human text; show enough to recognise them.
    if value.chars().count() <= 16 {
        value.to_string()
    } else {
        format!("{}...", value.chars().take(8).collect::<String>())
    }
}

/// Extra HTTP headers sent with every RPC request of a gated endpoint.
///
/// Header values are treated as secrets and omitted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders(BTreeMap<String, String>);

impl AuthHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers carrying HTTP basic credentials, as used by KAS-style gateways.
    pub fn basic(access_key_id: &str, secret_access_key: &str) -> Self {
        let token = STANDARD.encode(format!("{}:{}", access_key_id, secret_access_key));
        Self::new().with("Authorization", format!("Basic {}", token))
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check every entry is a legal HTTP header.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in &self.0 {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name '{}'", name))?;
            HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header '{}'", name))?;
        }
        Ok(())
    }
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// One deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    /// Unique key of the profile (e.g. `baobab`, `cypress`).
    pub name: String,
    /// The JSON-RPC endpoint.
    pub rpc_url: String,
    /// Headers for gated RPC endpoints. `None` for public endpoints.
    pub auth_headers: Option<AuthHeaders>,
    /// Signing credentials. The first one deploys.
    pub accounts: Vec<AccountKey>,
    /// The chain id the endpoint is expected to report.
    pub chain_id: Option<u64>,
    /// Gas limit for the deployment transaction.
    pub gas_limit: Option<u64>,
}

impl NetworkProfile {
    pub fn new(
        name: impl Into<String>,
        rpc_url: impl Into<String>,
        accounts: Vec<AccountKey>,
    ) -> Self {
        Self {
            name: name.into(),
            rpc_url: rpc_url.into(),
            auth_headers: None,
            accounts,
            chain_id: None,
            gas_limit: None,
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_auth_headers(mut self, headers: AuthHeaders) -> Self {
        self.auth_headers = Some(headers);
        self
    }

    /// The deploying account.
    pub fn deployer_key(&self) -> Option<&AccountKey> {
        self.accounts.first()
    }

    /// Parse the RPC URL, requiring an http(s) scheme and a host.
    pub fn parsed_rpc_url(&self) -> Result<Url, String> {
        let url = Url::parse(&self.rpc_url)
            .map_err(|e| format!("malformed rpc url '{}': {}", self.rpc_url, e))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "rpc url '{}' must use http or https, got '{}'",
                self.rpc_url,
                url.scheme()
            ));
        }

        if url.host().is_none() {
            return Err(format!("rpc url '{}' has no host", self.rpc_url));
        }

        Ok(url)
    }

    /// Validate the profile for use as a deploy target.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("profile name is empty".to_string());
        }

        self.parsed_rpc_url()?;

        if self.accounts.is_empty() {
            return Err("at least one account is required".to_string());
        }

        for (index, account) in self.accounts.iter().enumerate() {
            account
                .validate()
                .map_err(|e| format!("accounts[{}]: {}", index, e))?;
        }

        if let Some(headers) = &self.auth_headers {
            headers.validate()?;
        }

        if self.chain_id == Some(0) {
            return Err("chain id must be positive".to_string());
        }

        if self.gas_limit == Some(0) {
            return Err("gas limit must be positive".to_string());
        }

        Ok(())
    }
}
