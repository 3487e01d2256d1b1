//! Storage engine facade over the embedded ordered store.
//!
//! The engine itself (sled) is a black box: byte keys, byte values, ordered
//! iteration. This facade adds the timestamped-record variants the
//! coordinator depends on. Deletes never remove a key; they upsert a
//! tombstone so the deletion survives merging against stale replicas.

use crate::record::{CodecError, TimestampRecord};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("stored record corrupt: {0}")]
    Codec(#[from] CodecError),
}

/// Handle to the local ordered key/value engine. Cheap to clone; all clones
/// share the same underlying store and are safe for concurrent use.
#[derive(Debug, Clone)]
pub struct Engine {
    db: sled::Db,
}

impl Engine {
    /// Open or create an engine at the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self, EngineError> {
        let db = sled::open(data_dir)?;
        tracing::info!(keys = db.len(), "storage engine opened at {:?}", data_dir);
        Ok(Self { db })
    }

    /// Point lookup of the raw stored bytes.
    pub fn get(&self, key: &[u8]) -> Result<Option<sled::IVec>, EngineError> {
        Ok(self.db.get(key)?)
    }

    /// Insert or overwrite the raw stored bytes for a key.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Physically remove a key. Idempotent. The coordinator never calls
    /// this for client deletes; tombstones go through [`Engine::delete_record`].
    pub fn remove(&self, key: &[u8]) -> Result<(), EngineError> {
        self.db.remove(key)?;
        Ok(())
    }

    /// Ordered scan from `from` (inclusive) to `to` (exclusive), or to the
    /// end of the keyspace when `to` is absent.
    pub fn range(&self, from: &[u8], to: Option<&[u8]>) -> sled::Iter {
        match to {
            Some(end) => self.db.range(from..end),
            None => self.db.range(from..),
        }
    }

    /// Best-effort maintenance pass. Tombstones are retained regardless.
    pub fn compact(&self) -> Result<(), EngineError> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush and release the engine. Clones of this handle keep working
    /// until dropped; this only guarantees durability of prior writes.
    pub fn close(&self) -> Result<(), EngineError> {
        self.db.flush()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Timestamped variants
    // -----------------------------------------------------------------------

    /// Read the decoded record for a key; absent when the key is unknown.
    pub fn get_record(&self, key: &[u8]) -> Result<TimestampRecord, EngineError> {
        match self.get(key)? {
            Some(bytes) => Ok(TimestampRecord::decode(&bytes)?),
            None => Ok(TimestampRecord::absent()),
        }
    }

    /// Store a live value stamped at `timestamp`.
    pub fn put_record(&self, key: &[u8], value: &[u8], timestamp: i64) -> Result<(), EngineError> {
        let record = TimestampRecord::value(timestamp, value.to_vec());
        self.upsert(key, &record.encode())
    }

    /// Store a tombstone stamped at `timestamp`. This is a write, not a
    /// removal: the tombstone must survive to beat stale values on merge.
    pub fn delete_record(&self, key: &[u8], timestamp: i64) -> Result<(), EngineError> {
        let record = TimestampRecord::tombstone(timestamp);
        self.upsert(key, &record.encode())
    }

    /// Ordered scan of visible records: live values only, decoded to the
    /// raw client bytes. Tombstoned keys are skipped, as are entries that
    /// fail to decode (logged, never fatal to the scan).
    pub fn visible_range(
        &self,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        let mut rows = Vec::new();
        for entry in self.range(from, to) {
            let (key, value) = entry?;
            match TimestampRecord::decode(&value) {
                Ok(record) if record.is_value() => {
                    rows.push((key.to_vec(), record.into_value()));
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(key = ?key, %err, "skipping corrupt record in range scan");
                }
            }
        }
        Ok(rows)
    }
}
