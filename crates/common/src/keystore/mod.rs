//! Local custody of the identity key and per-paste content keys
//!
//! The key store is the only mutable state shared between in-flight
//! operations. Readers always see either the table before a mutation or the
//! table after it: writers build the next table, persist it, and only then
//! swap it in, one writer at a time.
//!
//! Nothing in here talks to the network.

mod table;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

use crate::crypto::{KeyError, Secret, SecretError, SecretKey};

use table::ContentKeyTable;

pub use table::TABLE_VERSION;

pub const KEY_FILE_NAME: &str = "key.pem";
pub const CONTENT_KEYS_FILE_NAME: &str = "content_keys.json";

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("failed to generate identity: {0}")]
    KeyGeneration(#[source] KeyError),

    #[error("failed to import key from {}: {reason}", .path.display())]
    KeyImport { path: PathBuf, reason: String },

    #[error("an identity is already stored, refusing to replace it")]
    IdentityExists,

    #[error("failed to generate content key: {0}")]
    ContentKeyGeneration(#[from] SecretError),

    #[error("content key already exists for paste {0}")]
    DuplicateContentKey(String),

    #[error("no content key for paste {0}")]
    UnknownContentKey(String),

    #[error("corrupt content key table: {0}")]
    CorruptTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity and content key custody
///
/// Cheap to clone; every clone shares the same table.
#[derive(Debug, Clone)]
pub struct KeyStore {
    inner: Arc<KeyStoreInner>,
}

#[derive(Debug)]
struct KeyStoreInner {
    /// Directory holding `key.pem` and `content_keys.json`,
    ///  `None` for an ephemeral in-memory store
    dir: Option<PathBuf>,
    /// Identity slot for the ephemeral store
    identity: RwLock<Option<SecretKey>>,
    /// paste id -> content key
    content_keys: RwLock<HashMap<String, Secret>>,
    /// Serializes table writers
    write_lock: tokio::sync::Mutex<()>,
}

impl KeyStore {
    /// Open the key store rooted at `dir`, creating the directory if needed
    /// and loading any existing content key table.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let table_path = dir.join(CONTENT_KEYS_FILE_NAME);
        let content_keys = match tokio::fs::read(&table_path).await {
            Ok(bytes) => ContentKeyTable::from_json(&bytes)?.into_keys()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            "KEYSTORE: opened {} with {} content keys",
            dir.display(),
            content_keys.len()
        );

        Ok(Self::with_parts(Some(dir), content_keys))
    }

    /// A store that lives only as long as the process
    pub fn ephemeral() -> Self {
        Self::with_parts(None, HashMap::new())
    }

    fn with_parts(dir: Option<PathBuf>, content_keys: HashMap<String, Secret>) -> Self {
        Self {
            inner: Arc::new(KeyStoreInner {
                dir,
                identity: RwLock::new(None),
                content_keys: RwLock::new(content_keys),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Generate a fresh identity from the OS entropy source
    pub fn generate_identity() -> Result<SecretKey, KeyStoreError> {
        let key = SecretKey::generate().map_err(KeyStoreError::KeyGeneration)?;
        tracing::info!("KEYSTORE: generated identity {}", key.public());
        Ok(key)
    }

    /// Load a private key from a user supplied file.
    ///
    /// Accepts a PEM `PRIVATE KEY` block or the raw key as hex.
    pub async fn import_identity(path: impl AsRef<Path>) -> Result<SecretKey, KeyStoreError> {
        let path = path.as_ref();
        let import_error = |reason: String| KeyStoreError::KeyImport {
            path: path.to_path_buf(),
            reason,
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(import_error("file not found".to_string()))
            }
            Err(e) => return Err(import_error(e.to_string())),
        };

        let key = parse_identity(&contents).map_err(import_error)?;
        tracing::info!("KEYSTORE: imported identity {}", key.public());
        Ok(key)
    }

    /// Persist the identity so it is found by the next `load_identity`.
    ///
    /// Never replaces a stored identity: losing it loses every account
    /// bound to it. Fails with `IdentityExists` instead.
    pub async fn persist_identity(&self, key: &SecretKey) -> Result<(), KeyStoreError> {
        let _guard = self.inner.write_lock.lock().await;
        match &self.inner.dir {
            Some(dir) => {
                write_private_new(&dir.join(KEY_FILE_NAME), key.to_pem().as_bytes()).await?;
            }
            None => {
                let mut identity = self.inner.identity.write();
                if identity.is_some() {
                    return Err(KeyStoreError::IdentityExists);
                }
                *identity = Some(key.clone());
            }
        }
        tracing::info!("KEYSTORE: stored identity {}", key.public());
        Ok(())
    }

    /// Load the persisted identity.
    ///
    /// Returns `None` when no identity has been created yet. A key file that
    /// exists but cannot be parsed is an error.
    pub async fn load_identity(&self) -> Result<Option<SecretKey>, KeyStoreError> {
        let Some(dir) = &self.inner.dir else {
            return Ok(self.inner.identity.read().clone());
        };

        let path = dir.join(KEY_FILE_NAME);
        let pem = match tokio::fs::read_to_string(&path).await {
            Ok(pem) => pem,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        SecretKey::from_pem(&pem)
            .map(Some)
            .map_err(|e| KeyStoreError::KeyImport {
                path,
                reason: e.to_string(),
            })
    }

    /// Look up the content key for a paste.
    ///
    /// `None` is the normal answer for pastes authored somewhere else.
    pub fn lookup_content_key(&self, paste_id: &str) -> Option<Secret> {
        self.inner.content_keys.read().get(paste_id).cloned()
    }

    /// Number of content keys held
    pub fn content_key_count(&self) -> usize {
        self.inner.content_keys.read().len()
    }

    /// Generate and store a fresh key for a paste being authored here.
    ///
    /// Fails if `paste_id` already has a key.
    pub async fn new_content_key(&self, paste_id: &str) -> Result<Secret, KeyStoreError> {
        self.update(|keys| {
            if keys.contains_key(paste_id) {
                return Err(KeyStoreError::DuplicateContentKey(paste_id.to_string()));
            }
            let secret = Secret::generate()?;
            keys.insert(paste_id.to_string(), secret.clone());
            Ok(secret)
        })
        .await
    }

    /// Return the key for `paste_id`, creating one if none exists.
    pub async fn content_key_or_create(&self, paste_id: &str) -> Result<Secret, KeyStoreError> {
        if let Some(secret) = self.lookup_content_key(paste_id) {
            return Ok(secret);
        }

        let _guard = self.inner.write_lock.lock().await;
        // another writer may have created it while we waited
        if let Some(secret) = self.lookup_content_key(paste_id) {
            return Ok(secret);
        }

        let mut next = self.inner.content_keys.read().clone();
        let secret = Secret::generate()?;
        next.insert(paste_id.to_string(), secret.clone());
        self.commit(next).await?;

        tracing::debug!("KEYSTORE: created content key for paste {}", paste_id);
        Ok(secret)
    }

    /// Move a content key to a new paste id.
    ///
    /// Used once the server has assigned the permanent id for a paste that
    /// was encrypted under a temporary one.
    pub async fn rebind_content_key(&self, from: &str, to: &str) -> Result<(), KeyStoreError> {
        if from == to {
            return Ok(());
        }

        self.update(|keys| {
            if keys.contains_key(to) {
                return Err(KeyStoreError::DuplicateContentKey(to.to_string()));
            }
            let secret = keys
                .remove(from)
                .ok_or_else(|| KeyStoreError::UnknownContentKey(from.to_string()))?;
            keys.insert(to.to_string(), secret);
            Ok(())
        })
        .await?;

        tracing::debug!("KEYSTORE: rebound content key {} -> {}", from, to);
        Ok(())
    }

    /// Drop the content key for a paste. Returns whether a key was removed.
    pub async fn discard_content_key(&self, paste_id: &str) -> Result<bool, KeyStoreError> {
        if self.lookup_content_key(paste_id).is_none() {
            return Ok(false);
        }
        self.update(|keys| Ok(keys.remove(paste_id).is_some())).await
    }

    /// Apply `f` to a copy of the table, persist the copy and swap it in.
    async fn update<T, F>(&self, f: F) -> Result<T, KeyStoreError>
    where
        F: FnOnce(&mut HashMap<String, Secret>) -> Result<T, KeyStoreError>,
    {
        let _guard = self.inner.write_lock.lock().await;
        let mut next = self.inner.content_keys.read().clone();
        let out = f(&mut next)?;
        self.commit(next).await?;
        Ok(out)
    }

    /// Caller must hold `write_lock`
    async fn commit(&self, next: HashMap<String, Secret>) -> Result<(), KeyStoreError> {
        if let Some(dir) = &self.inner.dir {
            let json = ContentKeyTable::from_keys(&next).to_json()?;
            write_private(&dir.join(CONTENT_KEYS_FILE_NAME), &json).await?;
        }
        *self.inner.content_keys.write() = next;
        Ok(())
    }
}

fn parse_identity(contents: &str) -> Result<SecretKey, String> {
    let trimmed = contents.trim();
    if trimmed.starts_with("-----BEGIN") {
        return SecretKey::from_pem(trimmed).map_err(|e| e.to_string());
    }

    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return SecretKey::from_hex(hex).map_err(|e| e.to_string());
    }

    Err("unsupported key format, expected a PEM PRIVATE KEY block or a hex encoded key".into())
}

/// Write `bytes` to `path` atomically, readable only by the owner.
async fn write_private(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension("tmp");
    write_tmp(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await
}

/// Like [`write_private`] but fails with `IdentityExists` if `path` is
/// already there. The final link is atomic, so a concurrent writer in
/// another process cannot be clobbered either.
async fn write_private_new(path: &Path, bytes: &[u8]) -> Result<(), KeyStoreError> {
    if tokio::fs::try_exists(path).await? {
        return Err(KeyStoreError::IdentityExists);
    }

    let tmp_path = path.with_extension("tmp");
    write_tmp(&tmp_path, bytes).await?;
    let linked = tokio::fs::hard_link(&tmp_path, path).await;
    tokio::fs::remove_file(&tmp_path).await?;
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(KeyStoreError::IdentityExists)
        }
        Err(e) => Err(e.into()),
    }
}

async fn write_tmp(tmp_path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_load_identity_none_when_missing() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = KeyStore::open(temp.path()).await.unwrap();
        assert!(store.load_identity().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_survives_reopen() {
        let temp = tempfile::TempDir::new().unwrap();
        let key = KeyStore::generate_identity().unwrap();

        let store = KeyStore::open(temp.path()).await.unwrap();
        store.persist_identity(&key).await.unwrap();
        drop(store);

        let reopened = KeyStore::open(temp.path()).await.unwrap();
        let loaded = reopened.load_identity().await.unwrap().unwrap();
        assert_eq!(loaded.public(), key.public());
    }

    #[tokio::test]
    async fn test_stored_identity_is_never_replaced() {
        let temp = tempfile::TempDir::new().unwrap();
        let first = KeyStore::generate_identity().unwrap();
        let second = KeyStore::generate_identity().unwrap();

        let store = KeyStore::open(temp.path()).await.unwrap();
        store.persist_identity(&first).await.unwrap();
        assert!(matches!(
            store.persist_identity(&second).await,
            Err(KeyStoreError::IdentityExists)
        ));

        // a second handle on the same directory is refused too
        let other = KeyStore::open(temp.path()).await.unwrap();
        assert!(matches!(
            other.persist_identity(&second).await,
            Err(KeyStoreError::IdentityExists)
        ));

        let loaded = store.load_identity().await.unwrap().unwrap();
        assert_eq!(loaded.public(), first.public());
        assert!(!temp.path().join("key.tmp").exists());
    }

    #[tokio::test]
    async fn test_concurrent_persists_keep_one_identity() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = KeyStore::open(temp.path()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = KeyStore::generate_identity().unwrap();
                store.persist_identity(&key).await.map(|_| key.public())
            }));
        }

        let mut stored = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(public) => stored.push(public),
                Err(KeyStoreError::IdentityExists) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(stored.len(), 1);

        let loaded = store.load_identity().await.unwrap().unwrap();
        assert_eq!(loaded.public(), stored[0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let store = KeyStore::open(temp.path()).await.unwrap();
        store
            .persist_identity(&KeyStore::generate_identity().unwrap())
            .await
            .unwrap();

        let meta = std::fs::metadata(temp.path().join(KEY_FILE_NAME)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_identity_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join(KEY_FILE_NAME), "garbage").unwrap();
        let store = KeyStore::open(temp.path()).await.unwrap();
        assert!(matches!(
            store.load_identity().await,
            Err(KeyStoreError::KeyImport { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_identity_formats() {
        let temp = tempfile::TempDir::new().unwrap();
        let key = KeyStore::generate_identity().unwrap();

        let pem_path = temp.path().join("id.pem");
        std::fs::write(&pem_path, key.to_pem()).unwrap();
        let imported = KeyStore::import_identity(&pem_path).await.unwrap();
        assert_eq!(imported.public(), key.public());

        let hex_path = temp.path().join("id.hex");
        std::fs::write(&hex_path, format!("0x{}\n", hex::encode(key.to_bytes()))).unwrap();
        let imported = KeyStore::import_identity(&hex_path).await.unwrap();
        assert_eq!(imported.public(), key.public());

        let bad_path = temp.path().join("id.txt");
        std::fs::write(&bad_path, "ssh-ed25519 AAAA...").unwrap();
        assert!(matches!(
            KeyStore::import_identity(&bad_path).await,
            Err(KeyStoreError::KeyImport { .. })
        ));

        assert!(matches!(
            KeyStore::import_identity(temp.path().join("missing")).await,
            Err(KeyStoreError::KeyImport { .. })
        ));
    }

    #[tokio::test]
    async fn test_content_keys_survive_reopen() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = KeyStore::open(temp.path()).await.unwrap();
        let secret = store.new_content_key("p1").await.unwrap();
        drop(store);

        let reopened = KeyStore::open(temp.path()).await.unwrap();
        assert_eq!(reopened.lookup_content_key("p1"), Some(secret));
        assert_eq!(reopened.lookup_content_key("p2"), None);
    }

    #[tokio::test]
    async fn test_new_content_key_is_unique_per_paste() {
        let store = KeyStore::ephemeral();
        store.new_content_key("p1").await.unwrap();
        assert!(matches!(
            store.new_content_key("p1").await,
            Err(KeyStoreError::DuplicateContentKey(_))
        ));
    }

    #[tokio::test]
    async fn test_content_key_or_create_is_stable() {
        let store = KeyStore::ephemeral();
        let a = store.content_key_or_create("p1").await.unwrap();
        let b = store.content_key_or_create("p1").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.content_key_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_agree() {
        let store = KeyStore::ephemeral();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.content_key_or_create("shared").await.unwrap() })
            })
            .collect();

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.content_key_count(), 1);
    }

    #[tokio::test]
    async fn test_rebind_and_discard() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = KeyStore::open(temp.path()).await.unwrap();
        let secret = store.new_content_key("temp").await.unwrap();

        store.rebind_content_key("temp", "p1").await.unwrap();
        assert_eq!(store.lookup_content_key("temp"), None);
        assert_eq!(store.lookup_content_key("p1"), Some(secret));

        assert!(matches!(
            store.rebind_content_key("temp", "p2").await,
            Err(KeyStoreError::UnknownContentKey(_))
        ));

        assert!(store.discard_content_key("p1").await.unwrap());
        assert!(!store.discard_content_key("p1").await.unwrap());

        let reopened = KeyStore::open(temp.path()).await.unwrap();
        assert_eq!(reopened.content_key_count(), 0);
    }

    #[tokio::test]
    async fn test_ephemeral_identity() {
        let store = KeyStore::ephemeral();
        assert!(store.load_identity().await.unwrap().is_none());

        let key = KeyStore::generate_identity().unwrap();
        store.persist_identity(&key).await.unwrap();
        assert_eq!(
            store.load_identity().await.unwrap().unwrap().public(),
            key.public()
        );

        let other = KeyStore::generate_identity().unwrap();
        assert!(matches!(
            store.persist_identity(&other).await,
            Err(KeyStoreError::IdentityExists)
        ));
    }
}
