//! Calibration constants for discovery and scanning
//!
//! # Scan strategy
//!
//! Table bases move on every game update, so discovery scans committed
//! readable memory for known marker strings and votes among projected
//! candidate bases. The constants here bound that scan and encode the
//! empirically calibrated acceptance thresholds.
//!
//! The vote threshold was measured against one stride/window combination
//! and does not generalize: treat it as per-table calibration data, not a
//! universal constant.

/// Bytes read per slab when walking a region (bounds peak memory and
/// limits the blast radius of a partial read failure).
pub const SLAB_BYTES: usize = 256 * 1024;

/// Default executable name of the target process.
pub const DEFAULT_PROCESS_NAME: &str = "nba2k26.exe";

/// Number of prior record slots projected per marker hit.
///
/// A hit only proves some record matched; the true base may be up to this
/// many slots earlier, and each projection contributes one vote.
pub const BACK_PROJECTION_WINDOW: u32 = 600;

/// Votes required before a candidate base is accepted.
///
/// Calibrated against the player table (stride 1176, window 600); see the
/// module docs before reusing it for other strides.
pub const VOTE_THRESHOLD: u32 = 151;

/// Half-width of the hinted scan window placed around the module image or
/// around a previously resolved base.
pub const HINT_WINDOW: u64 = 0x800_0000;

/// Low/high bounds of the broad fallback sweep. Anything below 4 GiB is
/// dominated by image/stack mappings and is slow to walk, so the fallback
/// starts above it.
pub const SWEEP_LOW: u64 = 0x1_0000_0000;
pub const SWEEP_HIGH: u64 = 0x7FFF_FFFF_FFFF;

/// Per-table discovery calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTuning {
    pub vote_threshold: u32,
    pub back_window: u32,
}

impl Default for DiscoveryTuning {
    fn default() -> Self {
        Self {
            vote_threshold: VOTE_THRESHOLD,
            back_window: BACK_PROJECTION_WINDOW,
        }
    }
}

/// Build the disjoint partition list a discovery pass walks.
///
/// Hinted windows (around the module image and any prior base) come first,
/// then the broad high-address sweep. Overlapping ranges are merged so the
/// parallel vote tally equals a sequential scan over the concatenation —
/// a candidate must never be counted twice because two ranges overlapped.
pub fn scan_partitions(module_base: u64, module_size: u64, hint: Option<u64>) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if module_base != 0 {
        ranges.push((module_base.saturating_sub(HINT_WINDOW), module_base));
        ranges.push((module_base, module_base + module_size.max(HINT_WINDOW)));
    }
    if let Some(base) = hint {
        ranges.push((base.saturating_sub(HINT_WINDOW), base + HINT_WINDOW));
    }
    ranges.push((SWEEP_LOW, SWEEP_HIGH));
    normalize_partitions(ranges)
}

/// Sort ranges and merge any that touch or overlap, yielding disjoint
/// partitions covering the same union of addresses.
pub fn normalize_partitions(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    ranges.retain(|(low, high)| high > low);
    ranges.sort_unstable();

    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (low, high) in ranges {
        match merged.last_mut() {
            Some((_, prev_high)) if low <= *prev_high => {
                *prev_high = (*prev_high).max(high);
            }
            _ => merged.push((low, high)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_merges_overlaps() {
        let merged = normalize_partitions(vec![(100, 200), (150, 300), (400, 500)]);
        assert_eq!(merged, vec![(100, 300), (400, 500)]);
    }

    #[test]
    fn test_normalize_drops_empty_ranges() {
        let merged = normalize_partitions(vec![(100, 100), (50, 40), (10, 20)]);
        assert_eq!(merged, vec![(10, 20)]);
    }

    #[test]
    fn test_partitions_are_disjoint() {
        // Module image above 4 GiB overlaps the fallback sweep; the merged
        // list must still be strictly disjoint.
        let parts = scan_partitions(0x1_4000_0000, 0x400_0000, Some(0x1_8000_0000));
        for pair in parts.windows(2) {
            assert!(pair[0].1 < pair[1].0, "partitions overlap: {:?}", pair);
        }
    }
}
