use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Account;
use crate::RegistryError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    address: Address,
    private_key: String,
}

/// JSON file of `{address: {address, privateKey}}` entries.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<db_dir>/<network>/<file_name>`.
    pub fn for_network(db_dir: impl AsRef<Path>, network: &str, file_name: &str) -> Self {
        Self::new(db_dir.as_ref().join(network).join(file_name))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every stored account. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<Account>, RegistryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.path).map_err(|e| {
            RegistryError::KeyStore(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let stored: BTreeMap<String, StoredKey> = serde_json::from_str(json.trim())
            .map_err(|e| {
                RegistryError::KeyStore(format!("failed to parse {}: {e}", self.path.display()))
            })?;

        let accounts = stored
            .into_values()
            .map(|entry| {
                let account = Account::from_private_key(&entry.private_key).map_err(|e| {
                    RegistryError::KeyStore(format!("bad key for {}: {e}", entry.address))
                })?;
                if account.address() != entry.address {
                    return Err(RegistryError::KeyStore(format!(
                        "key for {} derives {}",
                        entry.address,
                        account.address()
                    )));
                }
                Ok(account)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(count = accounts.len(), path = %self.path.display(), "loaded accounts");
        Ok(accounts)
    }

    /// Replaces the file contents with `accounts`.
    pub fn save(&self, accounts: &[Account]) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RegistryError::KeyStore(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let stored: BTreeMap<String, StoredKey> = accounts
            .iter()
            .map(|account| {
                (
                    account.address().to_string(),
                    StoredKey {
                        address: account.address(),
                        private_key: account.private_key_hex(),
                    },
                )
            })
            .collect();

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| RegistryError::KeyStore(format!("failed to serialize accounts: {e}")))?;
        fs::write(&self.path, json).map_err(|e| {
            RegistryError::KeyStore(format!("failed to write {}: {e}", self.path.display()))
        })?;

        info!(count = accounts.len(), path = %self.path.display(), "saved accounts");
        Ok(())
    }

    /// Adds `account` to the stored set.
    pub fn append(&self, account: &Account) -> Result<(), RegistryError> {
        let mut accounts = self.load()?;
        if !accounts.iter().any(|existing| existing.address() == account.address()) {
            accounts.push(account.clone());
        }
        self.save(&accounts)
    }
}

/// Generates `count` random accounts.
pub fn generate_accounts(count: usize) -> Vec<Account> {
    let accounts: Vec<_> = (0..count).map(|_| Account::random()).collect();
    info!(count, "generated new accounts");
    accounts
}
