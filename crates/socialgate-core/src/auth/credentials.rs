use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use keyring::Entry;
use thiserror::Error;
use tracing::debug;

use super::session::Session;

/// Default keychain service name
pub const SERVICE_NAME: &str = "socialgate";

/// Keychain account under which the session is stored
const SESSION_ACCOUNT: &str = "session";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Stored session is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Stored session is unreadable: {0}")]
    Unreadable(String),

    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// The record exists but can never be decoded; it should be removed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed(_) | StoreError::Unreadable(_))
    }
}

/// Durable home for the serialized session.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Session>, StoreError>;
    async fn save(&self, session: &Session) -> Result<(), StoreError>;
    /// Remove the stored session. Removing nothing is not an error.
    async fn clear(&self) -> Result<(), StoreError>;
}

pub(crate) fn encode(session: &Session) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(session)?)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Session, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

// ============================================================================
// OS keychain
// ============================================================================

/// Stores the session JSON as the secret of a single keychain entry.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
    account: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: SESSION_ACCOUNT.to_string(),
        }
    }

    fn entry(service: &str, account: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(service, account)?)
    }
}

fn read_secret(result: Result<String, keyring::Error>) -> Result<Option<String>, StoreError> {
    match result {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(keyring::Error::BadEncoding(bytes)) => Err(StoreError::Unreadable(format!(
            "keychain secret is not UTF-8 ({} bytes)",
            bytes.len()
        ))),
        Err(e) => Err(StoreError::from(e)),
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn load(&self) -> Result<Option<Session>, StoreError> {
        let (service, account) = (self.service.clone(), self.account.clone());
        let secret = tokio::task::spawn_blocking(move || {
            read_secret(Self::entry(&service, &account)?.get_password())
        })
        .await??;

        secret.map(|s| decode(s.as_bytes())).transpose()
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let secret = encode(session)?;
        let (service, account) = (self.service.clone(), self.account.clone());
        tokio::task::spawn_blocking(move || {
            Self::entry(&service, &account)?.set_password(&secret)?;
            Ok::<_, StoreError>(())
        })
        .await??;
        debug!(service = %self.service, "Session stored in keychain");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let (service, account) = (self.service.clone(), self.account.clone());
        tokio::task::spawn_blocking(move || {
            match Self::entry(&service, &account)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(StoreError::from(e)),
            }
        })
        .await?
    }
}

// ============================================================================
// JSON file
// ============================================================================

/// Plain `session.json` in the cache directory. Used where no keychain is
/// available.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn load(&self) -> Result<Option<Session>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, encode(session)?).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Keeps the encoded session in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw bytes, e.g. a record written by an older build.
    pub fn with_raw(bytes: Vec<u8>) -> Self {
        Self {
            slot: Mutex::new(Some(bytes)),
        }
    }

    pub fn raw(&self) -> Option<Vec<u8>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<Session>, StoreError> {
        self.raw().map(|bytes| decode(&bytes)).transpose()
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let bytes = encode(session)?.into_bytes();
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}
