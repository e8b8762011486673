//! Secret storage for the bearer token.
//!
//! On Windows this uses the Credential Manager (via the `keyring` crate), on
//! macOS the Keychain, and on Linux the Secret Service API. Non-secret
//! session data lives in the local cache database instead.

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};

const SERVICE_NAME: &str = "station-ledger";

pub const KEY_AUTH_TOKEN: &str = "auth_token";

/// Where secrets are kept. The keyring in production, memory in tests and
/// headless hosts without a secret service.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl CredentialStore for KeyringStore {
    /// Returns `None` when the entry does not exist (or the platform returns
    /// a "not found" error).
    fn get(&self, key: &str) -> Option<String> {
        let entry = match Entry::new(SERVICE_NAME, key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(pw),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, key).map_err(|e| LedgerError::Storage(e.to_string()))?;
        entry
            .set_password(value)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        info!(key, "credential stored");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, key).map_err(|e| LedgerError::Storage(e.to_string()))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(LedgerError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .remove(key);
        Ok(())
    }
}
