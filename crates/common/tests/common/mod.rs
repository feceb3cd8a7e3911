//! Shared test utilities for key store integration tests
#![allow(dead_code)]

use common::cipher::PasteCipher;
use common::keystore::KeyStore;
use tempfile::TempDir;

/// Set up an on-disk key store holding a fresh identity
pub async fn setup_test_env() -> (KeyStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = KeyStore::open(temp_dir.path()).await.unwrap();
    let identity = KeyStore::generate_identity().unwrap();
    store.persist_identity(&identity).await.unwrap();
    (store, temp_dir)
}

/// Reopen the store rooted at `dir` as a fresh process would
pub async fn reopen(dir: &TempDir) -> (KeyStore, PasteCipher) {
    let store = KeyStore::open(dir.path()).await.unwrap();
    let cipher = PasteCipher::new(store.clone());
    (store, cipher)
}
