//! CLI command implementations.

pub mod discover;
pub mod field;
pub mod probe;
pub mod regions;

#[cfg(target_os = "windows")]
pub use session::with_engine;

#[cfg(target_os = "windows")]
mod session {
    use anyhow::{Context, Result};
    use courtside_core::{MemoryReader, ProcessHandle, RosterEngine, SchemaRepository};

    use crate::Args;

    /// Attach, load the schema, and hand a ready engine to `f`.
    pub fn with_engine<T>(
        args: &Args,
        writable: bool,
        f: impl FnOnce(&mut RosterEngine<MemoryReader<'_>>) -> Result<T>,
    ) -> Result<T> {
        let handle = ProcessHandle::find_and_open(&args.process, writable)
            .with_context(|| format!("attaching to {}", args.process))?;
        let reader = MemoryReader::new(&handle);
        let schema = SchemaRepository::load(&args.schema, &args.version)
            .with_context(|| format!("loading schema {}", args.schema.display()))?;
        let mut engine = RosterEngine::new(reader, schema);
        f(&mut engine)
    }
}

#[cfg(not(target_os = "windows"))]
pub fn unsupported() -> anyhow::Error {
    anyhow::anyhow!("attaching to a live process requires Windows")
}
