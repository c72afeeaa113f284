use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::table::TableKind;

/// One verified marker occurrence: the record address implied by a matched
/// name pair (or sequence head).
#[derive(Debug, Clone, Serialize)]
pub struct MarkerHit {
    pub target: String,
    pub address: u64,
}

/// A proposed table base and how many marker projections landed on it.
/// Ephemeral: produced per discovery pass, never persisted past tallying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateVote {
    pub address: u64,
    pub votes: u32,
}

/// Outcome of one discovery pass, conclusive or not. Inconclusive passes
/// carry the same report inside [`crate::Error::DiscoveryInconclusive`] so
/// a human or a fallback config can pick from the candidate list.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub table: TableKind,
    pub hits: Vec<MarkerHit>,
    /// Top candidates by (votes desc, address asc).
    pub candidates: Vec<CandidateVote>,
    pub chosen: Option<u64>,
    pub threshold: u32,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}
