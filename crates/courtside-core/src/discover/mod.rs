//! Heuristic table-base discovery
//!
//! Table bases move with every game update, so they are rediscovered by
//! scanning readable memory for known marker strings:
//!
//! - **Name pairs** (players, staff): find the last-name pattern, verify
//!   the first name at its fixed relative offset, then project up to
//!   `back_window` prior record slots — each projection is one vote for a
//!   candidate base. The tally is a commutative per-partition sum, so the
//!   result does not depend on thread completion order.
//! - **Exact sequences** (teams, stadiums): a candidate is accepted only if
//!   every expected name appears at `candidate + i*stride + name_offset`.
//!
//! Candidates are ranked (votes desc, address asc) and the first one that
//! passes the caller's validation probe wins. The probe is what separates
//! a true base from back-projections of the same hits, which collect
//! identical vote counts.
//!
//! Once a partition's tally crosses the threshold it cancels its siblings.
//! Cancellation is advisory (a flag checked between slabs), so workers
//! always leave the process handle in a clean state; the early exit is the
//! one deliberately racy part of the pass.

mod report;

pub use report::{CandidateVote, DiscoveryReport, MarkerHit};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use encoding_rs::UTF_16LE;
use memchr::memmem;
use tracing::{debug, info, warn};

use crate::config::{DiscoveryTuning, SLAB_BYTES};
use crate::error::{Error, Result};
use crate::memory::{ReadMemory, slab_spans};
use crate::table::TableKind;

/// Candidates carried in a report.
const TOP_CANDIDATES: usize = 8;

/// Marker spec for tables addressed by per-record first/last name pairs.
#[derive(Debug, Clone)]
pub struct NamePairSpec {
    pub stride: u64,
    pub first_offset: u64,
    pub last_offset: u64,
    /// Known `(first, last)` pairs expected to exist in the table.
    pub targets: Vec<(String, String)>,
    pub tuning: DiscoveryTuning,
}

/// Marker spec for tables addressed by an ordered run of distinct names at
/// one fixed offset.
#[derive(Debug, Clone)]
pub struct SequenceSpec {
    pub stride: u64,
    pub name_offset: u64,
    pub max_chars: usize,
    /// Expected names of records 0..n, in table order.
    pub names: Vec<String>,
}

/// Cooperative cancellation shared by the scan workers.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// NUL-terminated UTF-16LE marker bytes for a name.
pub fn encode_marker(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((text.len() + 1) * 2);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

fn read_wide_str<R: ReadMemory>(reader: &R, addr: u64, max_chars: usize) -> Option<String> {
    let raw = reader.read_bytes(addr, max_chars.max(1) * 2).ok()?;
    let end = raw
        .chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map(|units| units * 2)
        .unwrap_or(raw.len());
    let (decoded, _, _) = UTF_16LE.decode(&raw[..end]);
    Some(decoded.trim().to_string())
}

/// Name-pair discovery over `partitions`, one worker per partition.
///
/// `validate` is probed against ranked candidates and should read the
/// table's key field, accepting only non-empty printable text. Returns
/// `Err(DiscoveryInconclusive)` carrying the full report when no candidate
/// crosses the threshold and survives the probe.
pub fn discover_name_pairs<R: ReadMemory>(
    reader: &R,
    table: TableKind,
    spec: &NamePairSpec,
    partitions: &[(u64, u64)],
    cancel: &CancelToken,
    validate: &(dyn Fn(u64) -> bool + Sync),
) -> Result<DiscoveryReport> {
    let started = Instant::now();
    let patterns: Vec<(Vec<u8>, Vec<u8>, String)> = spec
        .targets
        .iter()
        .map(|(first, last)| {
            (
                encode_marker(last),
                encode_marker(first),
                format!("{first} {last}"),
            )
        })
        .collect();

    let mut hits: Vec<MarkerHit> = Vec::new();
    let mut votes: HashMap<u64, u32> = HashMap::new();

    if partitions.len() <= 1 {
        for &(low, high) in partitions {
            let (part_hits, part_votes) =
                scan_name_pair_partition(reader, spec, &patterns, low, high, cancel);
            merge_votes(&mut votes, part_votes);
            hits.extend(part_hits);
        }
    } else {
        let results = std::thread::scope(|scope| {
            let workers: Vec<_> = partitions
                .iter()
                .map(|&(low, high)| {
                    let patterns = &patterns;
                    scope.spawn(move || {
                        scan_name_pair_partition(reader, spec, patterns, low, high, cancel)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("discovery worker panicked"))
                .collect::<Vec<_>>()
        });
        // Pure commutative merge: summing per-partition count maps gives
        // the same tally as a sequential scan over the concatenation.
        for (part_hits, part_votes) in results {
            merge_votes(&mut votes, part_votes);
            hits.extend(part_hits);
        }
    }
    hits.sort_by(|a, b| a.address.cmp(&b.address));

    // Every candidate at or above the threshold is probed in rank order;
    // back-projections of the same hits tie on votes and are rejected by
    // the probe, leaving the true base as the first survivor.
    let ranked = rank_candidates(&votes);
    let chosen = ranked
        .iter()
        .filter(|c| c.votes >= spec.tuning.vote_threshold)
        .find(|c| validate(c.address))
        .map(|c| c.address);

    let report = DiscoveryReport {
        table,
        hits,
        candidates: ranked.into_iter().take(TOP_CANDIDATES).collect(),
        chosen,
        threshold: spec.tuning.vote_threshold,
        elapsed_ms: started.elapsed().as_millis() as u64,
        finished_at: Utc::now(),
    };

    match chosen {
        Some(address) => {
            info!(
                "{} base discovered at {:#x} ({} hits, {}ms)",
                table,
                address,
                report.hits.len(),
                report.elapsed_ms
            );
            Ok(report)
        }
        None => {
            let best = report.candidates.first().map(|c| c.votes).unwrap_or(0);
            warn!(
                "{} discovery inconclusive: best candidate has {} votes (threshold {})",
                table, best, spec.tuning.vote_threshold
            );
            Err(Error::DiscoveryInconclusive {
                table: table.to_string(),
                votes: best,
                threshold: spec.tuning.vote_threshold,
                report: Box::new(report),
            })
        }
    }
}

fn merge_votes(into: &mut HashMap<u64, u32>, from: HashMap<u64, u32>) {
    for (address, count) in from {
        *into.entry(address).or_insert(0) += count;
    }
}

fn rank_candidates(votes: &HashMap<u64, u32>) -> Vec<CandidateVote> {
    let mut ranked: Vec<CandidateVote> = votes
        .iter()
        .map(|(&address, &votes)| CandidateVote { address, votes })
        .collect();
    ranked.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.address.cmp(&b.address)));
    ranked
}

fn scan_name_pair_partition<R: ReadMemory>(
    reader: &R,
    spec: &NamePairSpec,
    patterns: &[(Vec<u8>, Vec<u8>, String)],
    low: u64,
    high: u64,
    cancel: &CancelToken,
) -> (Vec<MarkerHit>, HashMap<u64, u32>) {
    let mut hits = Vec::new();
    let mut votes: HashMap<u64, u32> = HashMap::new();
    let finders: Vec<memmem::Finder<'_>> = patterns
        .iter()
        .map(|(last, _, _)| memmem::Finder::new(last.as_slice()))
        .collect();
    let overlap = patterns
        .iter()
        .map(|(last, _, _)| last.len())
        .max()
        .unwrap_or(0)
        .saturating_sub(1);

    for region in reader.regions(low, high) {
        if cancel.is_cancelled() {
            break;
        }
        for (slab_addr, slab_len, proper) in slab_spans(&region, SLAB_BYTES, overlap) {
            if cancel.is_cancelled() {
                return (hits, votes);
            }
            // A failed slab is skipped, never retried at the same address.
            let Ok(buffer) = reader.read_bytes(slab_addr, slab_len) else {
                continue;
            };

            for (finder, (_, first_pat, label)) in finders.iter().zip(patterns) {
                for idx in finder.find_iter(&buffer) {
                    if idx >= proper {
                        break;
                    }
                    let last_addr = slab_addr + idx as u64;
                    let Some(candidate) = last_addr.checked_sub(spec.last_offset) else {
                        continue;
                    };
                    if !verify_at(reader, &buffer, slab_addr, candidate + spec.first_offset, first_pat)
                    {
                        continue;
                    }
                    debug!("  {} matched at record {:#x}", label, candidate);
                    hits.push(MarkerHit {
                        target: label.clone(),
                        address: candidate,
                    });
                    // The hit could be any of the first `back_window` slots.
                    for k in 0..spec.tuning.back_window as u64 {
                        let Some(base) = candidate.checked_sub(k * spec.stride) else {
                            break;
                        };
                        *votes.entry(base).or_insert(0) += 1;
                    }
                }
            }

            if let Some(max) = votes.values().max()
                && *max >= spec.tuning.vote_threshold
            {
                cancel.cancel();
                return (hits, votes);
            }
        }
    }
    (hits, votes)
}

/// Check that `expected` bytes sit at `addr`, reading from the already
/// loaded slab when the span falls inside it and from the process
/// otherwise.
fn verify_at<R: ReadMemory>(
    reader: &R,
    buffer: &[u8],
    buffer_base: u64,
    addr: u64,
    expected: &[u8],
) -> bool {
    if addr >= buffer_base && addr + expected.len() as u64 <= buffer_base + buffer.len() as u64 {
        let start = (addr - buffer_base) as usize;
        return &buffer[start..start + expected.len()] == expected;
    }
    match reader.read_bytes(addr, expected.len()) {
        Ok(bytes) => bytes == expected,
        Err(_) => false,
    }
}

/// Exact-sequence discovery: every expected name must match in order.
pub fn discover_sequence<R: ReadMemory>(
    reader: &R,
    table: TableKind,
    spec: &SequenceSpec,
    partitions: &[(u64, u64)],
    cancel: &CancelToken,
    validate: &(dyn Fn(u64) -> bool + Sync),
) -> Result<DiscoveryReport> {
    let started = Instant::now();
    let Some(head) = spec.names.first() else {
        return Err(Error::ValueOutOfRange(
            "sequence discovery needs at least one expected name".into(),
        ));
    };
    let head_pattern = encode_marker(head);

    let results = std::thread::scope(|scope| {
        let workers: Vec<_> = partitions
            .iter()
            .map(|&(low, high)| {
                let head_pattern = &head_pattern;
                scope.spawn(move || {
                    scan_sequence_partition(reader, spec, head_pattern, low, high, cancel)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("discovery worker panicked"))
            .collect::<Vec<_>>()
    });

    let mut hits = Vec::new();
    let mut votes: HashMap<u64, u32> = HashMap::new();
    for (part_hits, part_votes) in results {
        merge_votes(&mut votes, part_votes);
        hits.extend(part_hits);
    }
    hits.sort_by(|a, b| a.address.cmp(&b.address));

    let ranked = rank_candidates(&votes);
    let chosen = ranked
        .iter()
        .find(|c| validate(c.address))
        .map(|c| c.address);

    let report = DiscoveryReport {
        table,
        hits,
        candidates: ranked.into_iter().take(TOP_CANDIDATES).collect(),
        chosen,
        threshold: 1,
        elapsed_ms: started.elapsed().as_millis() as u64,
        finished_at: Utc::now(),
    };

    match chosen {
        Some(address) => {
            info!(
                "{} base discovered at {:#x} (full sequence of {} names, {}ms)",
                table,
                address,
                spec.names.len(),
                report.elapsed_ms
            );
            Ok(report)
        }
        None => Err(Error::DiscoveryInconclusive {
            table: table.to_string(),
            votes: 0,
            threshold: 1,
            report: Box::new(report),
        }),
    }
}

fn scan_sequence_partition<R: ReadMemory>(
    reader: &R,
    spec: &SequenceSpec,
    head_pattern: &[u8],
    low: u64,
    high: u64,
    cancel: &CancelToken,
) -> (Vec<MarkerHit>, HashMap<u64, u32>) {
    let mut hits = Vec::new();
    let mut votes: HashMap<u64, u32> = HashMap::new();
    let finder = memmem::Finder::new(head_pattern);
    let overlap = head_pattern.len().saturating_sub(1);

    for region in reader.regions(low, high) {
        if cancel.is_cancelled() {
            break;
        }
        for (slab_addr, slab_len, proper) in slab_spans(&region, SLAB_BYTES, overlap) {
            if cancel.is_cancelled() {
                return (hits, votes);
            }
            let Ok(buffer) = reader.read_bytes(slab_addr, slab_len) else {
                continue;
            };

            for idx in finder.find_iter(&buffer) {
                if idx >= proper {
                    break;
                }
                let head_addr = slab_addr + idx as u64;
                let Some(candidate) = head_addr.checked_sub(spec.name_offset) else {
                    continue;
                };
                if !verify_sequence(reader, spec, candidate) {
                    continue;
                }
                debug!("  full sequence matched at base {:#x}", candidate);
                hits.push(MarkerHit {
                    target: spec.names[0].clone(),
                    address: candidate,
                });
                *votes.entry(candidate).or_insert(0) += 1;
                cancel.cancel();
                return (hits, votes);
            }
        }
    }
    (hits, votes)
}

fn verify_sequence<R: ReadMemory>(reader: &R, spec: &SequenceSpec, candidate: u64) -> bool {
    spec.names.iter().enumerate().skip(1).all(|(i, expected)| {
        let addr = candidate + i as u64 * spec.stride + spec.name_offset;
        match read_wide_str(reader, addr, spec.max_chars) {
            Some(actual) => !actual.is_empty() && actual.eq_ignore_ascii_case(expected.trim()),
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_marker_nul_terminated() {
        let bytes = encode_marker("Ab");
        assert_eq!(bytes, vec![0x41, 0, 0x62, 0, 0, 0]);
    }

    #[test]
    fn test_rank_candidates_orders_votes_then_address() {
        let mut votes = HashMap::new();
        votes.insert(0x3000u64, 5u32);
        votes.insert(0x1000, 7);
        votes.insert(0x2000, 7);
        let ranked = rank_candidates(&votes);
        assert_eq!(
            ranked,
            vec![
                CandidateVote { address: 0x1000, votes: 7 },
                CandidateVote { address: 0x2000, votes: 7 },
                CandidateVote { address: 0x3000, votes: 5 },
            ]
        );
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
