//! Registry of deployable network profiles.

use std::collections::BTreeMap;

use crate::{DeployError, NetworkProfile};

/// The set of network targets known to this process.
///
/// Populated once at startup and read-only afterwards, so it can be shared
/// between executors behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, NetworkProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile.
    ///
    /// Fails with [`DeployError::DuplicateProfile`] if the name is taken (the
    /// existing entry is left untouched) and with [`DeployError::InvalidProfile`]
    /// if the profile cannot be used as a deploy target.
    pub fn register(&mut self, profile: NetworkProfile) -> Result<(), DeployError> {
        if self.profiles.contains_key(&profile.name) {
            return Err(DeployError::DuplicateProfile(profile.name));
        }

        profile
            .validate()
            .map_err(|reason| DeployError::invalid_profile(&profile.name, reason))?;

        tracing::debug!(
            profile = %profile.name,
            rpc_url = %profile.rpc_url,
            chain_id = ?profile.chain_id,
            accounts = profile.accounts.len(),
            "Registered network profile"
        );

        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Look up a profile by name.
    pub fn resolve(&self, name: &str) -> Result<&NetworkProfile, DeployError> {
        self.profiles
            .get(name)
            .ok_or_else(|| DeployError::UnknownProfile(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountKey, AuthHeaders};

    const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn profile(name: &str, key: &str) -> NetworkProfile {
        NetworkProfile::new(name, "http://localhost:8545", vec![AccountKey::new(key)])
    }

    #[test]
    fn test_resolve_returns_registered_profile() {
        let baobab = NetworkProfile::new(
            "baobab",
            "https://api.baobab.klaytn.net:8651",
            vec![AccountKey::new(KEY_A), AccountKey::new(KEY_B)],
        )
        .with_chain_id(1001)
        .with_gas_limit(8_500_000)
        .with_auth_headers(AuthHeaders::basic("id", "secret").with("x-chain-id", "1001"));

        let mut registry = ProfileRegistry::new();
        registry.register(baobab.clone()).unwrap();
        registry.register(profile("local", KEY_A)).unwrap();

        assert_eq!(registry.resolve("baobab").unwrap(), &baobab);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["baobab", "local"]);
    }

    #[test]
    fn test_duplicate_leaves_existing_entry() {
        let mut registry = ProfileRegistry::new();
        registry.register(profile("local", KEY_A)).unwrap();

        let err = registry.register(profile("local", KEY_B)).unwrap_err();
        assert!(matches!(err, DeployError::DuplicateProfile(ref name) if name == "local"));

        let kept = registry.resolve("local").unwrap();
        assert_eq!(kept.accounts, vec![AccountKey::new(KEY_A)]);
    }

    #[test]
    fn test_empty_accounts_not_registered() {
        let mut registry = ProfileRegistry::new();
        let err = registry
            .register(NetworkProfile::new("local", "http://localhost:8545", vec![]))
            .unwrap_err();

        assert!(matches!(err, DeployError::InvalidProfile { .. }));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("local"),
            Err(DeployError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_placeholder_account_not_registered() {
        let mut registry = ProfileRegistry::new();
        let err = registry.register(profile("klaytn", "YOUR_ACCOUNT")).unwrap_err();
        assert!(err.to_string().contains("placeholder"), "{}", err);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_long_non_ascii_account_not_registered() {
        let mut registry = ProfileRegistry::new();
        let account = format!("z{}", "é".repeat(20));

        let err = registry.register(profile("local", &account)).unwrap_err();

        assert!(matches!(err, DeployError::InvalidProfile { .. }));
        assert!(err.to_string().contains("zééééééé..."), "{}", err);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_malformed_url_not_registered() {
        let mut registry = ProfileRegistry::new();
        let mut bad = profile("local", KEY_A);
        bad.rpc_url = "localhost".to_string();
        assert!(matches!(
            registry.register(bad),
            Err(DeployError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_unknown_profile() {
        let registry = ProfileRegistry::new();
        let err = registry.resolve("cypress").unwrap_err();
        assert_eq!(err.to_string(), "unknown network profile 'cypress'");
    }
}
