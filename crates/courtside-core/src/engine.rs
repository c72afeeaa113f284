//! Engine facade
//!
//! [`RosterEngine`] is what external collaborators (editor UIs, importers)
//! talk to: one attached process, one immutable schema, one cache of
//! resolved table bases. Per-field failures come back as `None`/`false`
//! so bulk scans never abort; attach and schema failures are loud.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::chain;
use crate::codec::{self, FieldValue};
use crate::config::{self, DiscoveryTuning};
use crate::discover::{
    self, CancelToken, DiscoveryReport, NamePairSpec, SequenceSpec,
};
use crate::error::{Error, Result};
use crate::memory::WriteMemory;
use crate::schema::{FieldKind, SchemaIndex};
use crate::table::{ResolvedBase, TableKind, TableRecordView};

/// Known-name markers the discovery pass scans for, per table.
#[derive(Debug, Clone)]
pub struct DiscoveryTargets {
    pub player_pairs: Vec<(String, String)>,
    pub staff_pairs: Vec<(String, String)>,
    pub team_names: Vec<String>,
    pub stadium_names: Vec<String>,
}

impl Default for DiscoveryTargets {
    fn default() -> Self {
        let pair = |first: &str, last: &str| (first.to_string(), last.to_string());
        Self {
            player_pairs: vec![pair("Tyrese", "Maxey"), pair("Victor", "Wembanyama")],
            staff_pairs: Vec::new(),
            team_names: [
                "76ers",
                "Bucks",
                "Bulls",
                "Cavaliers",
                "Celtics",
                "Clippers",
                "Grizzlies",
                "Hawks",
                "Heat",
                "Hornets",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            stadium_names: Vec::new(),
        }
    }
}

/// One attached process plus everything needed to read and write fields.
pub struct RosterEngine<M: WriteMemory> {
    memory: M,
    schema: SchemaIndex,
    targets: DiscoveryTargets,
    tuning: HashMap<TableKind, DiscoveryTuning>,
    bases: HashMap<TableKind, ResolvedBase>,
}

impl<M: WriteMemory> RosterEngine<M> {
    pub fn new(memory: M, schema: SchemaIndex) -> Self {
        Self {
            memory,
            schema,
            targets: DiscoveryTargets::default(),
            tuning: HashMap::new(),
            bases: HashMap::new(),
        }
    }

    pub fn with_targets(mut self, targets: DiscoveryTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn set_tuning(&mut self, table: TableKind, tuning: DiscoveryTuning) {
        self.tuning.insert(table, tuning);
    }

    pub fn schema(&self) -> &SchemaIndex {
        &self.schema
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Swap in a freshly loaded schema. Every cached base is invalidated:
    /// strides and key offsets may have changed underneath them.
    pub fn reload_schema(&mut self, schema: SchemaIndex) {
        info!("Schema reloaded ({}); base cache cleared", schema.version_label());
        self.schema = schema;
        self.bases.clear();
    }

    pub fn invalidate(&mut self, table: TableKind) {
        if self.bases.remove(&table).is_some() {
            debug!("Invalidated cached base for {}", table);
        }
    }

    pub fn invalidate_all(&mut self) {
        self.bases.clear();
    }

    /// Resolve the live base address of `table`.
    ///
    /// Checks the cache (re-probing it before trusting it), then walks the
    /// configured pointer chains. Returns `None` when nothing resolves or
    /// validates — callers then either run discovery or give up.
    pub fn resolve_table_base(&mut self, table: TableKind) -> Option<u64> {
        if let Some(cached) = self.bases.get(&table) {
            let address = cached.address;
            if self.probe_base(table, address) {
                return Some(address);
            }
            // A cached base that stops validating is discarded, never
            // silently reused.
            warn!("Cached {} base {:#x} failed probe; discarding", table, address);
            self.bases.remove(&table);
        }

        let stride = self.schema.stride(table)?;
        let module_base = self.memory.base_address();
        for spec in self.schema.chains(table) {
            let Some(address) = chain::resolve(&self.memory, module_base, spec) else {
                continue;
            };
            if self.probe_base(table, address) {
                debug!("{} base {:#x} resolved via pointer chain", table, address);
                self.bases
                    .insert(table, ResolvedBase::new(table, address, stride));
                return Some(address);
            }
        }
        None
    }

    /// Run a discovery pass for `table` and cache the accepted base.
    ///
    /// The cache entry is invalidated *before* the scan starts so a write
    /// can never race a rediscovery into a stale address.
    pub fn run_discovery(&mut self, table: TableKind) -> Result<DiscoveryReport> {
        let hint = self.bases.get(&table).map(|b| b.address);
        self.invalidate(table);

        let stride = self
            .schema
            .stride(table)
            .ok_or_else(|| Error::SchemaInvalid(format!("no stride for {table}")))?;
        let partitions = config::scan_partitions(
            self.memory.base_address(),
            self.memory.module_size(),
            hint,
        );
        let cancel = CancelToken::new();
        // Back-projections of the same hits tie the true base on votes, so
        // the discovery probe also demands that the slot *before* the
        // candidate does not decode as a record: a base starts where valid
        // records stop.
        let validate = |address: u64| {
            if !self.probe_base(table, address) {
                return false;
            }
            match address.checked_sub(stride) {
                Some(prev) => !self.probe_base(table, prev),
                None => true,
            }
        };

        let report = match table {
            TableKind::Player | TableKind::Staff => {
                let spec = self.name_pair_spec(table, stride)?;
                discover::discover_name_pairs(
                    &self.memory,
                    table,
                    &spec,
                    &partitions,
                    &cancel,
                    &validate,
                )?
            }
            TableKind::Team | TableKind::Stadium => {
                let spec = self.sequence_spec(table, stride)?;
                discover::discover_sequence(
                    &self.memory,
                    table,
                    &spec,
                    &partitions,
                    &cancel,
                    &validate,
                )?
            }
        };

        if let Some(address) = report.chosen {
            self.bases
                .insert(table, ResolvedBase::new(table, address, stride));
        }
        Ok(report)
    }

    /// Read one field. `None` means "value unavailable": unknown field,
    /// unresolved base, out-of-bounds index, or unreadable memory.
    pub fn get(
        &mut self,
        table: TableKind,
        index: u32,
        category: &str,
        field: &str,
    ) -> Option<FieldValue> {
        let descriptor = self.schema.find(category, field)?.clone();
        let record = self.record_address(table, index)?;
        codec::decode(&self.memory, record, &descriptor)
    }

    /// Write one field. Failures are logged and reported as `false`; a bulk
    /// import treats each field independently.
    pub fn set(
        &mut self,
        table: TableKind,
        index: u32,
        category: &str,
        field: &str,
        value: &FieldValue,
    ) -> bool {
        let Some(descriptor) = self.schema.find(category, field).cloned() else {
            warn!("Unknown field {}/{}", category, field);
            return false;
        };
        let Some(record) = self.record_address(table, index) else {
            return false;
        };
        match codec::encode(&self.memory, record, &descriptor, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Write of {}/{} failed: {}", category, field, e);
                false
            }
        }
    }

    /// Render a pointer field value for humans: a cross-table slot label
    /// when the pointer lands inside a resolved table, hex otherwise.
    pub fn render_value(&self, value: &FieldValue) -> String {
        if let FieldValue::Pointer(ptr) = value {
            for base in self.bases.values() {
                if let Some(label) = codec::render_back_reference(*ptr, base) {
                    return label;
                }
            }
        }
        value.to_string()
    }

    fn record_address(&mut self, table: TableKind, index: u32) -> Option<u64> {
        self.resolve_table_base(table)?;
        let base = self.bases.get(&table)?.clone();
        // Bound the view by the nearest table known to sit above this one,
        // so contiguous tables cannot bleed into each other.
        let limit = self
            .bases
            .values()
            .filter(|other| other.table != table && other.address > base.address)
            .map(|other| other.address)
            .min();
        let view = match limit {
            Some(limit) => TableRecordView::bounded(base, limit),
            None => TableRecordView::new(base),
        };
        view.record_address(index)
    }

    fn name_pair_spec(&self, table: TableKind, stride: u64) -> Result<NamePairSpec> {
        let (category, targets) = match table {
            TableKind::Player => ("Vitals", &self.targets.player_pairs),
            TableKind::Staff => ("Staff Vitals", &self.targets.staff_pairs),
            _ => unreachable!("name-pair discovery only covers player-shaped tables"),
        };
        if targets.is_empty() {
            return Err(Error::ValueOutOfRange(format!(
                "no known name pairs configured for {table}"
            )));
        }
        let first = self.schema.find(category, "FIRSTNAME").ok_or_else(|| {
            Error::SchemaInvalid(format!("{category}/FIRSTNAME missing for discovery"))
        })?;
        let last = self.schema.find(category, "LASTNAME").ok_or_else(|| {
            Error::SchemaInvalid(format!("{category}/LASTNAME missing for discovery"))
        })?;
        Ok(NamePairSpec {
            stride,
            first_offset: first.offset,
            last_offset: last.offset,
            targets: targets.clone(),
            tuning: self.tuning.get(&table).copied().unwrap_or_default(),
        })
    }

    fn sequence_spec(&self, table: TableKind, stride: u64) -> Result<SequenceSpec> {
        let names = match table {
            TableKind::Team => &self.targets.team_names,
            TableKind::Stadium => &self.targets.stadium_names,
            _ => unreachable!("sequence discovery only covers name-run tables"),
        };
        if names.is_empty() {
            return Err(Error::ValueOutOfRange(format!(
                "no expected name sequence configured for {table}"
            )));
        }
        let key = self
            .schema
            .key_field(table)
            .ok_or_else(|| Error::SchemaInvalid(format!("no key field for {table}")))?;
        let FieldKind::Text { max_chars, .. } = key.kind else {
            return Err(Error::SchemaInvalid(format!(
                "key field for {table} is not text"
            )));
        };
        Ok(SequenceSpec {
            stride,
            name_offset: key.offset,
            max_chars,
            names: names.clone(),
        })
    }

    /// Accept a candidate base only if the table's key field decodes to
    /// non-empty printable text at record zero.
    fn probe_base(&self, table: TableKind, address: u64) -> bool {
        let Some(key) = self.schema.key_field(table) else {
            // No probe available: accept, the way literal configs are taken
            // on faith.
            return true;
        };
        match codec::decode(&self.memory, address, key) {
            Some(FieldValue::Text(text)) => {
                let trimmed = text.trim();
                !trimmed.is_empty()
                    && trimmed.chars().all(|c| (' '..='~').contains(&c))
            }
            _ => false,
        }
    }
}
