//! Journal of submitted deployment transactions.
//!
//! A transaction hash is recorded before the executor waits for confirmation,
//! so that a later run can look the transaction up instead of broadcasting a
//! second deployment.

use std::{
    fs::{File, OpenOptions},
    path::{Component, Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

/// The default journal directory.
pub const DEFAULT_JOURNAL_DIR: &str = ".deployments";

/// A deployment transaction that was broadcast but not yet seen confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub profile: String,
    pub contract: String,
    pub transaction_hash: B256,
    pub deployer: Address,
    pub nonce: u64,
    /// Hash of the creation bytecode, so a recompiled contract is not mistaken for the journaled one.
    pub bytecode_hash: B256,
    pub submitted_at: DateTime<Utc>,
}

/// Pending deployments stored as `<dir>/<profile>/<contract>.json`.
#[derive(Debug, Clone)]
pub struct DeploymentJournal {
    dir: PathBuf,
}

impl DeploymentJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, profile: &str, contract: &str) -> Result<PathBuf> {
        Ok(self
            .profile_dir(profile)?
            .join(format!("{}.json", file_name("contract", contract)?)))
    }

    fn profile_dir(&self, profile: &str) -> Result<PathBuf> {
        Ok(self.dir.join(file_name("profile", profile)?))
    }

    /// Take an exclusive lock for one (profile, contract) pair.
    ///
    /// The lock is released when the returned file is dropped.
    fn lock(&self, profile: &str, contract: &str) -> Result<File> {
        let dir = self.profile_dir(profile)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create journal directory {}", dir.display()))?;

        let lock_path = dir.join(format!("{}.lock", file_name("contract", contract)?));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

        Ok(file)
    }

    /// Record a submitted transaction, replacing any previous entry.
    pub fn record(&self, entry: &JournalEntry) -> Result<PathBuf> {
        let path = self.entry_path(&entry.profile, &entry.contract)?;
        let _lock = self.lock(&entry.profile, &entry.contract)?;

        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(entry).context("Failed to serialize journal entry")?;
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write journal entry to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move journal entry to {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            tx_hash = %entry.transaction_hash,
            "Journaled deployment transaction"
        );
        Ok(path)
    }

    /// Load the pending entry for (profile, contract), if any.
    pub fn load(&self, profile: &str, contract: &str) -> Result<Option<JournalEntry>> {
        let path = self.entry_path(profile, contract)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read journal entry {}", path.display()))?;
        let entry = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse journal entry {}", path.display()))?;

        Ok(Some(entry))
    }

    /// Forget the entry for (profile, contract).
    pub fn clear(&self, profile: &str, contract: &str) -> Result<()> {
        let path = self.entry_path(profile, contract)?;
        if !path.exists() {
            return Ok(());
        }

        let _lock = self.lock(profile, contract)?;
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove journal entry {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Cleared journal entry");
        Ok(())
    }
}

/// Names become single path components under the journal directory.
fn file_name<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => bail!("{} name '{}' cannot be used as a journal file name", kind, name),
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    fn entry() -> JournalEntry {
        JournalEntry {
            profile: "baobab".to_string(),
            contract: "AmoCoin".to_string(),
            transaction_hash: B256::repeat_byte(0x11),
            deployer: Address::repeat_byte(0x22),
            nonce: 7,
            bytecode_hash: B256::repeat_byte(0x33),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_then_load() {
        let dir = TempDir::new("amo-journal").unwrap();
        let journal = DeploymentJournal::new(dir.path());

        assert!(journal.load("baobab", "AmoCoin").unwrap().is_none());

        let entry = entry();
        let path = journal.record(&entry).unwrap();
        assert_eq!(path, dir.path().join("baobab/AmoCoin.json"));
        assert_eq!(journal.load("baobab", "AmoCoin").unwrap(), Some(entry));
        assert!(journal.load("cypress", "AmoCoin").unwrap().is_none());
    }

    #[test]
    fn test_record_replaces_previous_entry() {
        let dir = TempDir::new("amo-journal").unwrap();
        let journal = DeploymentJournal::new(dir.path());

        journal.record(&entry()).unwrap();
        let mut newer = entry();
        newer.nonce = 8;
        newer.transaction_hash = B256::repeat_byte(0x44);
        journal.record(&newer).unwrap();

        assert_eq!(journal.load("baobab", "AmoCoin").unwrap(), Some(newer));
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new("amo-journal").unwrap();
        let journal = DeploymentJournal::new(dir.path());

        journal.record(&entry()).unwrap();
        journal.clear("baobab", "AmoCoin").unwrap();
        assert!(journal.load("baobab", "AmoCoin").unwrap().is_none());

        // Clearing twice is fine.
        journal.clear("baobab", "AmoCoin").unwrap();
    }

    #[test]
    fn test_names_must_stay_inside_journal_dir() {
        let dir = TempDir::new("amo-journal").unwrap();
        let journal = DeploymentJournal::new(dir.path().join("journal"));

        for contract in ["../x", "a/b", "a\\b", "..", ".", "", "/tmp/x"] {
            let err = journal.load("baobab", contract).unwrap_err();
            assert!(err.to_string().contains("contract name"), "{:#}", err);
            assert!(journal.clear("baobab", contract).is_err());
        }

        let mut outside = entry();
        outside.contract = "../x".to_string();
        assert!(journal.record(&outside).is_err());

        let mut outside = entry();
        outside.profile = "..".to_string();
        let err = journal.record(&outside).unwrap_err();
        assert!(err.to_string().contains("profile name"), "{:#}", err);

        assert!(!dir.path().join("x.json").exists());
        assert!(!dir.path().join("x.lock").exists());
        assert!(!dir.path().join("journal").exists());
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let dir = TempDir::new("amo-journal").unwrap();
        let journal = DeploymentJournal::new(dir.path());

        std::fs::create_dir_all(dir.path().join("baobab")).unwrap();
        std::fs::write(dir.path().join("baobab/AmoCoin.json"), "not json").unwrap();
        assert!(journal.load("baobab", "AmoCoin").is_err());
    }
}
