//! Remote process memory access
//!
//! Everything that touches the target process goes through the traits in
//! this module: [`ReadMemory`] for reads and region enumeration,
//! [`WriteMemory`] for the write path. The OS-backed implementations
//! ([`ProcessHandle`], [`MemoryReader`]) are Windows-only; tests run
//! against [`MockMemory`].

pub mod mock;
#[cfg(target_os = "windows")]
mod process;
mod reader;
mod regions;

#[cfg(target_os = "windows")]
pub use process::{ProcessHandle, ProcessInfo, list_processes};
pub use reader::{ReadMemory, WriteMemory};
#[cfg(target_os = "windows")]
pub use reader::MemoryReader;
pub use regions::{MemoryRegion, slab_spans};

pub use mock::{MockMemory, MockMemoryBuilder};
