//! Record encoding on the ledger
//!
//! Records are JSON objects whose numeric fields are stored as decimal
//! strings, matching the layout already present on deployed ledgers.

use crate::error::{MarketError, StoreError};
use crate::ledger::LedgerStore;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serde adapter storing a `Display + FromStr` value as a JSON string
pub mod decimal {
    use serde::de::{self, Deserialize, Deserializer};
    use serde::Serializer;
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Typed record access on top of a raw byte store
pub trait RecordExt: LedgerStore {
    /// Load and decode a record; `None` when the key is absent
    fn get_record<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, MarketError> {
        match self.get_state(key)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| MarketError::MalformedRecord {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Encode and store a record; encoding failures surface as [`StoreError::Codec`]
    fn put_record<T: Serialize>(&mut self, key: &str, record: &T) -> Result<(), MarketError> {
        let bytes = serde_json::to_vec(record).map_err(StoreError::from)?;
        self.put_state(key, bytes)?;
        Ok(())
    }
}

impl<S: LedgerStore + ?Sized> RecordExt for S {}
