// OS keyring credential backend
//
// One keyring entry per account under the `indra` service, holding the
// stored session as JSON.

use tracing::debug;

use indra_core::{CoreError, CredentialStore, StoredSession};

const SERVICE: &str = "indra";

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(account: &str) -> Result<keyring::Entry, CoreError> {
        keyring::Entry::new(SERVICE, &format!("{account}/session")).map_err(store_error)
    }
}

fn store_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::CredentialStore {
        message: format!("keyring: {err}"),
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self, account: &str) -> Result<Option<StoredSession>, CoreError> {
        match Self::entry(account)?.get_password() {
            Ok(json) => serde_json::from_str(&json).map(Some).map_err(store_error),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(store_error(e)),
        }
    }

    fn save(&self, account: &str, record: &StoredSession) -> Result<(), CoreError> {
        let json = serde_json::to_string(record).map_err(store_error)?;
        Self::entry(account)?.set_password(&json).map_err(store_error)?;
        debug!(account, "session saved to keyring");
        Ok(())
    }

    fn clear(&self, account: &str) -> Result<(), CoreError> {
        match Self::entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(store_error(e)),
        }
    }
}
