//! Timestamped record codec and merge.
//!
//! Everything the engine persists, and everything peers exchange, is a
//! [`TimestampRecord`]: one tag byte, a big-endian i64 millisecond
//! timestamp, and (for live values) the raw client bytes. Replica answers
//! for a key are reconciled with [`merge`]: newest timestamp wins, and on a
//! timestamp tie a live value outranks a tombstone.

use std::cmp::Ordering;

/// Byte length of the fixed record header: tag (1) + timestamp (8).
pub const HEADER_LEN: usize = 9;

/// Wire tag of a [`TimestampRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    /// A live value written by PUT.
    Value,
    /// A tombstone written by DELETE.
    Deleted,
    /// Not found. Never persisted; only produced while merging.
    Absent,
}

impl RecordTag {
    const VALUE_BYTE: u8 = 1;
    const DELETED_BYTE: u8 = 0xFF; // -1 as a signed byte

    fn from_byte(byte: u8) -> Self {
        match byte {
            Self::VALUE_BYTE => RecordTag::Value,
            Self::DELETED_BYTE => RecordTag::Deleted,
            _ => RecordTag::Absent,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            RecordTag::Value => Self::VALUE_BYTE,
            RecordTag::Deleted => Self::DELETED_BYTE,
            RecordTag::Absent => 0,
        }
    }

    /// Tie-break rank: on equal timestamps a value beats a tombstone.
    fn rank(self) -> u8 {
        match self {
            RecordTag::Value => 2,
            RecordTag::Deleted => 1,
            RecordTag::Absent => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("record too short: {0} bytes, need at least 9")]
    Truncated(usize),
}

/// A timestamped record: the unit persisted by the engine and carried
/// between coordinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampRecord {
    tag: RecordTag,
    timestamp: i64,
    value: Vec<u8>,
}

impl TimestampRecord {
    /// A live value stamped at `timestamp`.
    pub fn value(timestamp: i64, value: Vec<u8>) -> Self {
        Self {
            tag: RecordTag::Value,
            timestamp,
            value,
        }
    }

    /// A tombstone stamped at `timestamp`. Carries no value.
    pub fn tombstone(timestamp: i64) -> Self {
        Self {
            tag: RecordTag::Deleted,
            timestamp,
            value: Vec::new(),
        }
    }

    /// The in-memory representation of "not found".
    pub fn absent() -> Self {
        Self {
            tag: RecordTag::Absent,
            timestamp: -1,
            value: Vec::new(),
        }
    }

    pub fn tag(&self) -> RecordTag {
        self.tag
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_value(&self) -> bool {
        self.tag == RecordTag::Value
    }

    pub fn is_deleted(&self) -> bool {
        self.tag == RecordTag::Deleted
    }

    pub fn is_absent(&self) -> bool {
        self.tag == RecordTag::Absent
    }

    /// The raw client bytes. Empty unless the record is a live value.
    pub fn value_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Consume the record, returning the raw client bytes.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Encode as `tag ∥ i64_be(timestamp) ∥ value?`.
    ///
    /// The value bytes are appended only for live values; tombstones and
    /// absent records encode to exactly [`HEADER_LEN`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.value.len());
        buf.push(self.tag.as_byte());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        if self.is_value() {
            buf.extend_from_slice(&self.value);
        }
        buf
    }

    /// Decode an encoded record.
    ///
    /// Empty input decodes to [`TimestampRecord::absent`]. Anything shorter
    /// than the header is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Ok(Self::absent());
        }
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated(bytes.len()));
        }
        let tag = RecordTag::from_byte(bytes[0]);
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&bytes[1..HEADER_LEN]);
        let timestamp = i64::from_be_bytes(ts_bytes);
        let value = if tag == RecordTag::Value {
            bytes[HEADER_LEN..].to_vec()
        } else {
            Vec::new()
        };
        Ok(Self {
            tag,
            timestamp,
            value,
        })
    }

    fn cmp_for_merge(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.tag.rank().cmp(&other.tag.rank()))
    }
}

/// Reduce a set of replica answers to a single record.
///
/// Absent answers are dropped; if nothing remains the result is absent.
/// Otherwise the record with the maximum timestamp wins, a value beating a
/// tombstone on a tie.
pub fn merge(records: impl IntoIterator<Item = TimestampRecord>) -> TimestampRecord {
    records
        .into_iter()
        .filter(|record| !record.is_absent())
        .max_by(|a, b| a.cmp_for_merge(b))
        .unwrap_or_else(TimestampRecord::absent)
}
