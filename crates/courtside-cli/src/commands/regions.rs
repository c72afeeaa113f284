use anyhow::Result;

use crate::Args;

#[cfg(target_os = "windows")]
pub fn run(args: &Args, low: u64, high: u64) -> Result<()> {
    use courtside_core::{MemoryReader, ProcessHandle, ReadMemory};

    let handle = ProcessHandle::find_and_open(&args.process, false)?;
    let reader = MemoryReader::new(&handle);

    println!(
        "module {:#x} + {:#x}",
        handle.base_address, handle.module_size
    );
    let mut total = 0u64;
    let mut count = 0usize;
    for region in reader.regions(low, high) {
        println!(
            "  {:#018x}  {:>12} bytes  protect {:#06x}",
            region.base, region.size, region.protect
        );
        total += region.size;
        count += 1;
    }
    println!("{} readable regions, {} MiB total", count, total / 1024 / 1024);
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn run(_args: &Args, _low: u64, _high: u64) -> Result<()> {
    Err(super::unsupported())
}
