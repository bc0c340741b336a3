// ── Credential persistence ──
//
// One record per account: the per-install mobile key, the current bearer
// token with its timing, the cached device list and the live-session energy
// baselines. Stores are synchronous and small; the session calls them
// outside of any async lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use indra_api::MobileKey;

use crate::energy::EnergyBaseline;
use crate::error::CoreError;
use crate::model::Device;

/// Normalized store key for an account email.
pub fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}

// ── Records ──────────────────────────────────────────────────────────

/// What a store keeps per account.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub mobile_key: MobileKey,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Per-device energy baselines, so a restart mid-charge keeps counting.
    #[serde(default)]
    pub energy: BTreeMap<String, EnergyBaseline>,
}

impl StoredSession {
    pub fn new(mobile_key: MobileKey) -> Self {
        Self {
            mobile_key,
            token: None,
            issued_at: None,
            expires_at: None,
            devices: Vec::new(),
            energy: BTreeMap::new(),
        }
    }

    /// The stored credential, if a token is present.
    pub fn credential(&self) -> Option<SessionCredential> {
        let token = self.token.clone()?;
        Some(SessionCredential {
            token: SecretString::from(token),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        })
    }

    pub fn clear_token(&mut self) {
        self.token = None;
        self.issued_at = None;
        self.expires_at = None;
    }
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("mobile_key", &self.mobile_key)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("devices", &self.devices.len())
            .field("energy", &self.energy.len())
            .finish()
    }
}

/// A bearer token with its timing, as held in memory.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub token: SecretString,
    /// Absent in records written without timing; such a token has an
    /// unknown age.
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

// ── Store trait ──────────────────────────────────────────────────────

/// Persistent storage for [`StoredSession`] records, keyed by
/// [`account_key`].
pub trait CredentialStore: Send + Sync {
    fn load(&self, account: &str) -> Result<Option<StoredSession>, CoreError>;
    fn save(&self, account: &str, record: &StoredSession) -> Result<(), CoreError>;
    fn clear(&self, account: &str) -> Result<(), CoreError>;
}

// ── In-memory store ──────────────────────────────────────────────────

/// Process-local store for tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, StoredSession>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, account: &str) -> Result<Option<StoredSession>, CoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(account).cloned())
    }

    fn save(&self, account: &str, record: &StoredSession) -> Result<(), CoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(account.to_owned(), record.clone());
        Ok(())
    }

    fn clear(&self, account: &str) -> Result<(), CoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(account);
        Ok(())
    }
}

// ── JSON file store ──────────────────────────────────────────────────

/// All accounts in one JSON file. Writes go through a temp file and a
/// rename; on Unix the file is created `0600`.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, StoredSession>, CoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| CoreError::CredentialStore {
                message: format!("{} is corrupt: {e}", self.path.display()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(CoreError::credential_store(e)),
        }
    }

    fn write_all(&self, records: &BTreeMap<String, StoredSession>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(CoreError::credential_store)?;
        }
        let json = serde_json::to_vec_pretty(records).map_err(CoreError::credential_store)?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = open_private(&tmp).map_err(CoreError::credential_store)?;
        file.write_all(&json).map_err(CoreError::credential_store)?;
        file.sync_all().map_err(CoreError::credential_store)?;
        drop(file);

        std::fs::rename(&tmp, &self.path).map_err(CoreError::credential_store)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt as _;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, account: &str) -> Result<Option<StoredSession>, CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(account))
    }

    fn save(&self, account: &str, record: &StoredSession) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.read_all()?;
        records.insert(account.to_owned(), record.clone());
        self.write_all(&records)
    }

    fn clear(&self, account: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.read_all()?;
        if records.remove(account).is_some() {
            self.write_all(&records)?;
        }
        Ok(())
    }
}

// ── Read-modify-write handle ─────────────────────────────────────────

/// The session's view of its own record. Serializes read-modify-write
/// cycles between the auth flow and the poller.
#[derive(Clone)]
pub(crate) struct Persistence {
    store: Arc<dyn CredentialStore>,
    account: String,
    lock: Arc<Mutex<()>>,
}

impl Persistence {
    pub(crate) fn new(store: Arc<dyn CredentialStore>, email: &str) -> Self {
        Self {
            store,
            account: account_key(email),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub(crate) fn account(&self) -> &str {
        &self.account
    }

    /// Load the record, creating it (with a fresh mobile key) if absent.
    pub(crate) fn load_or_init(&self) -> Result<StoredSession, CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = self.store.load(&self.account)? {
            return Ok(record);
        }
        let record = StoredSession::new(MobileKey::generate());
        self.store.save(&self.account, &record)?;
        Ok(record)
    }

    pub(crate) fn update(
        &self,
        mutate: impl FnOnce(&mut StoredSession),
    ) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = match self.store.load(&self.account)? {
            Some(record) => record,
            None => StoredSession::new(MobileKey::generate()),
        };
        mutate(&mut record);
        self.store.save(&self.account, &record)
    }

    pub(crate) fn forget(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.clear(&self.account)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record() -> StoredSession {
        let mut r = StoredSession::new(MobileKey::from("key-1".to_owned()));
        r.token = Some("t".repeat(64));
        r.issued_at = Some(Utc::now());
        r
    }

    #[test]
    fn account_key_is_case_insensitive() {
        assert_eq!(account_key("  Driver@Example.COM "), "driver@example.com");
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", record());
        assert!(rendered.contains("[REDACTED]"), "{rendered}");
        assert!(!rendered.contains("tttttttt"), "{rendered}");
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load("a").unwrap().is_none());

        store.save("a", &record()).unwrap();
        let loaded = store.load("a").unwrap().unwrap();
        assert_eq!(loaded.mobile_key.as_str(), "key-1");

        store.clear("a").unwrap();
        assert!(store.load("a").unwrap().is_none());
    }

    #[test]
    fn file_store_keeps_accounts_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/credentials.json"));

        store.save("a@x.com", &record()).unwrap();
        let mut other = record();
        other.token = None;
        store.save("b@x.com", &other).unwrap();

        let reopened = FileCredentialStore::new(store.path());
        assert!(reopened.load("a@x.com").unwrap().unwrap().token.is_some());
        assert!(reopened.load("b@x.com").unwrap().unwrap().token.is_none());

        reopened.clear("a@x.com").unwrap();
        assert!(reopened.load("a@x.com").unwrap().is_none());
        assert!(reopened.load("b@x.com").unwrap().is_some());
        assert!(!dir.path().join("nested/credentials.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        FileCredentialStore::new(&path).save("a", &record()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileCredentialStore::new(&path).load("a").unwrap_err();
        assert!(matches!(err, CoreError::CredentialStore { .. }), "{err:?}");
    }

    #[test]
    fn persistence_generates_mobile_key_once() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let persistence = Persistence::new(Arc::clone(&store), "Me@X.com");

        let first = persistence.load_or_init().unwrap();
        let second = persistence.load_or_init().unwrap();
        assert_eq!(first.mobile_key, second.mobile_key);

        persistence
            .update(|r| r.token = Some("abc".into()))
            .unwrap();
        let stored = store.load("me@x.com").unwrap().unwrap();
        assert_eq!(stored.mobile_key, first.mobile_key);
        assert_eq!(stored.token.as_deref(), Some("abc"));
    }
}
