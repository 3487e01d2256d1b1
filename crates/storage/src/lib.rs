//! okv-storage: persistent ordered storage for a replicated KV node.
//!
//! Provides the timestamped record codec + merge algebra and a thin facade
//! over the embedded ordered engine (sled) exposing the raw and
//! timestamped operations the coordinator is built on.

pub mod engine;
pub mod record;
