//! Table identities, resolved bases, and record address arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The live record tables the engine knows how to address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum TableKind {
    Player,
    Team,
    Staff,
    Stadium,
}

impl TableKind {
    /// Key under `game_info` that carries this table's record stride.
    pub fn stride_key(&self) -> &'static str {
        match self {
            TableKind::Player => "playerSize",
            TableKind::Team => "teamSize",
            TableKind::Staff => "staffSize",
            TableKind::Stadium => "stadiumSize",
        }
    }

    /// Map a schema category to the table its records live in.
    pub fn for_category(category: &str) -> TableKind {
        let lower = category.trim().to_ascii_lowercase();
        if lower.starts_with("team") {
            TableKind::Team
        } else if lower.starts_with("staff") {
            TableKind::Staff
        } else if lower.starts_with("stadium") {
            TableKind::Stadium
        } else {
            TableKind::Player
        }
    }

    /// Upper bound on record indices scanned for this table.
    pub fn max_records(&self) -> u32 {
        match self {
            TableKind::Player => 5500,
            TableKind::Team => 400,
            TableKind::Staff => 400,
            TableKind::Stadium => 200,
        }
    }
}

/// A validated table base, cached per attached process.
///
/// Created by discovery or from a literal/chain config; invalidated
/// explicitly when the pid changes, the schema is reloaded, or a probe
/// fails — never left silently stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedBase {
    pub table: TableKind,
    pub address: u64,
    pub stride: u64,
    pub validated_at: DateTime<Utc>,
}

impl ResolvedBase {
    pub fn new(table: TableKind, address: u64, stride: u64) -> Self {
        Self {
            table,
            address,
            stride,
            validated_at: Utc::now(),
        }
    }
}

/// Computes record addresses from a resolved base, bounded by an optional
/// limit (typically the next table's base when the two are contiguous) and
/// the table's record cap. No state beyond the base it was built from.
#[derive(Debug, Clone)]
pub struct TableRecordView {
    base: ResolvedBase,
    limit: Option<u64>,
}

impl TableRecordView {
    pub fn new(base: ResolvedBase) -> Self {
        Self { base, limit: None }
    }

    /// Bound the view so records at or past `limit` are unaddressable.
    pub fn bounded(base: ResolvedBase, limit: u64) -> Self {
        Self {
            base,
            limit: Some(limit),
        }
    }

    pub fn base(&self) -> &ResolvedBase {
        &self.base
    }

    pub fn record_address(&self, index: u32) -> Option<u64> {
        if index >= self.base.table.max_records() {
            return None;
        }
        let addr = self.base.address + index as u64 * self.base.stride;
        if let Some(limit) = self.limit
            && addr + self.base.stride > limit
        {
            return None;
        }
        Some(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_address_stride() {
        let view = TableRecordView::new(ResolvedBase::new(TableKind::Player, 0x10000, 1176));
        assert_eq!(view.record_address(0), Some(0x10000));
        assert_eq!(view.record_address(7), Some(0x10000 + 7 * 1176));
    }

    #[test]
    fn test_record_address_bounded_by_limit() {
        let base = ResolvedBase::new(TableKind::Team, 0x1000, 0x100);
        let view = TableRecordView::bounded(base, 0x1300);
        assert_eq!(view.record_address(0), Some(0x1000));
        assert_eq!(view.record_address(2), Some(0x1200));
        // Record 3 would extend past the next table's base.
        assert_eq!(view.record_address(3), None);
    }

    #[test]
    fn test_record_address_caps_index() {
        let view = TableRecordView::new(ResolvedBase::new(TableKind::Stadium, 0x1000, 0x10));
        assert_eq!(view.record_address(200), None);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(TableKind::for_category("Vitals"), TableKind::Player);
        assert_eq!(TableKind::for_category("Team Vitals"), TableKind::Team);
        assert_eq!(TableKind::for_category("Staff Vitals"), TableKind::Staff);
        assert_eq!(TableKind::for_category("Stadium"), TableKind::Stadium);
        assert_eq!(TableKind::for_category("Attributes"), TableKind::Player);
    }
}
