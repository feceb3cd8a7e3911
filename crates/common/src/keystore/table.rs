use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::crypto::Secret;

use super::KeyStoreError;

/// Current on-disk version of the content key table
pub const TABLE_VERSION: u32 = 1;

/// Serialized form of the content key table
///
/// `{"version": 1, "keys": {"<paste id>": "<hex key>"}}`
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ContentKeyTable {
    version: u32,
    keys: BTreeMap<String, String>,
}

impl ContentKeyTable {
    pub fn from_keys(keys: &HashMap<String, Secret>) -> Self {
        Self {
            version: TABLE_VERSION,
            keys: keys
                .iter()
                .map(|(id, secret)| (id.clone(), secret.to_hex()))
                .collect(),
        }
    }

    pub fn into_keys(self) -> Result<HashMap<String, Secret>, KeyStoreError> {
        if self.version != TABLE_VERSION {
            return Err(KeyStoreError::CorruptTable(format!(
                "unsupported table version {}",
                self.version
            )));
        }

        self.keys
            .into_iter()
            .map(|(id, encoded)| {
                let secret = Secret::from_hex(&encoded).map_err(|e| {
                    KeyStoreError::CorruptTable(format!("bad key for paste {}: {}", id, e))
                })?;
                Ok((id, secret))
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, KeyStoreError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, KeyStoreError> {
        serde_json::from_slice(bytes).map_err(|e| KeyStoreError::CorruptTable(e.to_string()))
    }
}
