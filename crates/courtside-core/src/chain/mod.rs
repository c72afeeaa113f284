//! Pointer-chain specs and resolution.
//!
//! A chain turns a symbolic spec (module-relative RVA plus hops) into a
//! live absolute address. Resolution is deliberately unforgiving about
//! nulls: a zero or unreadable pointer anywhere in the chain means the
//! entity is not currently resolvable, which is an `Option::None`, not an
//! error. Callers decide whether to re-poll.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::trace;

use crate::memory::ReadMemory;

/// Shipped configs spell offsets as JSON numbers or `0x`-prefixed strings;
/// accept both.
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("negative or fractional address")),
        serde_json::Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(serde::de::Error::custom)
        }
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("fractional offset")),
        serde_json::Value::String(s) => {
            let s = s.trim();
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s),
            };
            let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => digits.parse::<i64>(),
            }
            .map_err(serde::de::Error::custom)?;
            Ok(if negative { -magnitude } else { magnitude })
        }
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

/// One hop in a pointer chain: add `offset`, optionally dereference, then
/// add `post_add`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainStep {
    #[serde(default, deserialize_with = "de_i64")]
    pub offset: i64,
    #[serde(default)]
    pub dereference: bool,
    #[serde(
        default,
        deserialize_with = "de_i64",
        alias = "post",
        alias = "postAdd",
        alias = "post_offset",
        alias = "postOffset"
    )]
    pub post_add: i64,
}

/// A symbolic address spec for one table base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointerChainSpec {
    /// Module-relative RVA, or an absolute address when `absolute` is set.
    #[serde(deserialize_with = "de_u64", alias = "address")]
    pub rva: u64,
    #[serde(default)]
    pub absolute: bool,
    /// Skip dereferencing entirely: the start address (plus `final_offset`)
    /// already is the table base.
    #[serde(default)]
    pub direct_table: bool,
    #[serde(default, alias = "chain")]
    pub steps: Vec<ChainStep>,
    #[serde(default, deserialize_with = "de_i64", alias = "finalOffset")]
    pub final_offset: i64,
}

impl PointerChainSpec {
    /// A literal, already-absolute table base.
    pub fn literal(address: u64) -> Self {
        Self {
            rva: address,
            absolute: true,
            direct_table: true,
            ..Default::default()
        }
    }
}

/// Walk `spec` against live memory. Returns the resolved absolute address,
/// or `None` the instant any dereference reads zero or fails.
pub fn resolve<R: ReadMemory>(reader: &R, module_base: u64, spec: &PointerChainSpec) -> Option<u64> {
    if spec.rva == 0 && !spec.absolute {
        return None;
    }
    let start = if spec.absolute {
        spec.rva
    } else {
        module_base.wrapping_add(spec.rva)
    };

    if spec.direct_table {
        return Some(start.wrapping_add_signed(spec.final_offset));
    }

    let mut ptr = reader.read_u64(start).ok()?;
    if ptr == 0 {
        return None;
    }

    for step in &spec.steps {
        ptr = ptr.wrapping_add_signed(step.offset);
        if step.dereference {
            if ptr == 0 {
                return None;
            }
            ptr = reader.read_u64(ptr).ok()?;
            if ptr == 0 {
                return None;
            }
        }
        ptr = ptr.wrapping_add_signed(step.post_add);
    }

    let resolved = ptr.wrapping_add_signed(spec.final_offset);
    trace!("chain rva={:#x} resolved to {:#x}", spec.rva, resolved);
    Some(resolved)
}
