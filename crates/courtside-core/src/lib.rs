//! # courtside-core
//!
//! Core library for reading and writing bit-packed roster records inside a
//! live game process.
//!
//! This crate provides:
//! - Windows process attach and remote memory access
//! - Versioned field schemas with load diagnostics
//! - Pointer-chain resolution to live table addresses
//! - Bit-level field decode/encode with domain scale conversions
//! - Heuristic table-base discovery via marker scanning and voting
//!
//! The GUI, import tooling, and assistant integrations are separate
//! consumers of the [`RosterEngine`] facade; nothing in here persists data
//! beyond the lifetime of the attached process.

pub mod chain;
pub mod codec;
pub mod config;
pub mod discover;
pub mod engine;
pub mod error;
pub mod memory;
pub mod schema;
pub mod table;

pub use chain::{ChainStep, PointerChainSpec};
pub use codec::{FieldValue, format_pointer, render_back_reference};
pub use config::DiscoveryTuning;
pub use discover::{
    CancelToken, CandidateVote, DiscoveryReport, MarkerHit, NamePairSpec, SequenceSpec,
};
pub use engine::{DiscoveryTargets, RosterEngine};
pub use error::{Error, Result};
#[cfg(target_os = "windows")]
pub use memory::{MemoryReader, ProcessHandle, ProcessInfo, list_processes};
pub use memory::{MemoryRegion, MockMemory, MockMemoryBuilder, ReadMemory, WriteMemory};
pub use schema::{
    FieldDescriptor, FieldKind, ParseReport, SchemaIndex, SchemaRepository, SkippedField,
    TextEncoding,
};
pub use table::{ResolvedBase, TableKind, TableRecordView};
