#![deny(missing_docs)]
#![doc = "Serial connections to the motes and the result protocol spoken over them."]

pub mod manager;
pub mod memory;
pub mod protocol;

pub use manager::{
    LinkOpener, SerialChannelManager, SerialOpener, DEFAULT_LINE_CAPACITY, MAX_LINE_BYTES,
};
pub use memory::{MemoryOpener, ScriptStep};
pub use protocol::{await_result, ProtocolOutcome, ProtocolState, ProtocolTiming, RecordSink};
