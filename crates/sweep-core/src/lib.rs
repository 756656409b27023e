#![deny(missing_docs)]
#![doc = "Core types and error model shared by the radio sweep orchestrator crates."]

pub mod errors;
/// Stable hashing over canonical JSON.
pub mod hash;
/// Canonical JSON serde helpers.
pub mod serde;
pub mod setup;

pub use errors::{ErrorInfo, SweepError};
pub use hash::stable_hash_string;
pub use crate::serde::{from_json_slice, to_canonical_json_bytes};
pub use setup::{
    map_jammer_channel, Channel, DeviceRole, ExperimentSetup, InterferenceKind, InterferenceType,
    RdcDriver, RebuildFlags, ResultKey, SweepPosition, JAMMER_SOURCE_CHANNEL,
    JAMMER_TARGET_CHANNEL,
};
