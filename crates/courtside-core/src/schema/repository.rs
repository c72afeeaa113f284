use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chain::PointerChainSpec;
use crate::error::{Error, Result};
use crate::schema::field::{FieldDescriptor, FieldKind, TextEncoding, normalize_name};
use crate::table::TableKind;

/// Fields that must exist for the schema to be usable at all. A schema
/// missing any of these is rejected outright: a partially valid schema
/// must never drive writes.
const REQUIRED_FIELDS: &[(TableKind, &str, &str)] = &[
    (TableKind::Player, "Vitals", "FIRSTNAME"),
    (TableKind::Player, "Vitals", "LASTNAME"),
];

/// Key text field probed when validating a candidate table base.
const KEY_FIELDS: &[(TableKind, &str, &str)] = &[
    (TableKind::Player, "Vitals", "LASTNAME"),
    (TableKind::Team, "Team Vitals", "TEAMNAME"),
    (TableKind::Staff, "Staff Vitals", "LASTNAME"),
    (TableKind::Stadium, "Stadium", "ARENANAME"),
];

/// One schema entry that was not materialized, and why. Part of the public
/// contract: callers inspect these to detect silent data loss.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedField {
    pub category: String,
    pub name: String,
    pub reason: String,
}

/// Load diagnostics for one schema document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseReport {
    pub version_label: String,
    pub discovered: usize,
    pub emitted: usize,
    pub skips_by_reason: BTreeMap<String, usize>,
    pub skipped: Vec<SkippedField>,
}

impl ParseReport {
    fn record_skip(&mut self, category: &str, name: &str, reason: &str) {
        *self.skips_by_reason.entry(reason.to_string()).or_insert(0) += 1;
        self.skipped.push(SkippedField {
            category: category.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Immutable, fully materialized schema for one version label.
///
/// Held by an engine instance and swapped whole on re-init, never mutated
/// in place.
#[derive(Debug)]
pub struct SchemaIndex {
    version_label: String,
    fields: HashMap<(String, String), Arc<FieldDescriptor>>,
    categories: BTreeMap<String, Vec<Arc<FieldDescriptor>>>,
    strides: HashMap<TableKind, u64>,
    chains: HashMap<TableKind, Vec<PointerChainSpec>>,
    parse_report: ParseReport,
}

impl SchemaIndex {
    pub fn version_label(&self) -> &str {
        &self.version_label
    }

    /// Look up one field by category and (fuzzily spelled) name.
    pub fn find(&self, category: &str, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields
            .get(&(normalize_name(category), normalize_name(name)))
    }

    /// All fields of one category, in document order.
    pub fn category(&self, category: &str) -> Option<&[Arc<FieldDescriptor>]> {
        self.categories
            .get(&normalize_name(category))
            .map(|v| v.as_slice())
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(|k| k.as_str())
    }

    pub fn stride(&self, table: TableKind) -> Option<u64> {
        self.strides.get(&table).copied()
    }

    pub fn chains(&self, table: TableKind) -> &[PointerChainSpec] {
        self.chains.get(&table).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The text field used to sanity-probe a candidate base of `table`.
    pub fn key_field(&self, table: TableKind) -> Option<&Arc<FieldDescriptor>> {
        KEY_FIELDS
            .iter()
            .find(|(kind, _, _)| *kind == table)
            .and_then(|(_, category, name)| self.find(category, name))
    }

    pub fn parse_report(&self) -> &ParseReport {
        &self.parse_report
    }
}

/// Loads schema documents and materializes the entry matching one version
/// label per field record.
pub struct SchemaRepository;

impl SchemaRepository {
    pub fn load<P: AsRef<Path>>(path: P, version_label: &str) -> Result<SchemaIndex> {
        let content = fs::read_to_string(&path)?;
        let index = Self::load_str(&content, version_label)?;
        info!(
            "Loaded schema {} ({} fields, {} skipped) from {}",
            version_label,
            index.parse_report.emitted,
            index.parse_report.skipped.len(),
            path.as_ref().display()
        );
        Ok(index)
    }

    pub fn load_str(content: &str, version_label: &str) -> Result<SchemaIndex> {
        let doc: Value = serde_json::from_str(content)?;
        let offsets = doc
            .get("offsets")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::SchemaInvalid("document has no 'offsets' array".into()))?;

        let mut report = ParseReport {
            version_label: version_label.to_string(),
            ..Default::default()
        };

        let version_info = doc
            .get("versions")
            .and_then(Value::as_object)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|(key, _)| version_key_matches(key, version_label))
                    .map(|(_, info)| info)
            });

        let strides = version_info
            .map(|info| parse_strides(info))
            .unwrap_or_default();
        let chains = version_info
            .map(|info| parse_base_pointers(info))
            .unwrap_or_default();

        let mut fields: HashMap<(String, String), Arc<FieldDescriptor>> = HashMap::new();
        let mut categories: BTreeMap<String, Vec<Arc<FieldDescriptor>>> = BTreeMap::new();

        for entry in offsets {
            report.discovered += 1;
            let Some(descriptor) = parse_field_entry(entry, version_label, &mut report) else {
                continue;
            };

            // The declared bit span must fit the record stride.
            let table = TableKind::for_category(&descriptor.category);
            if descriptor.deref_offset.is_none()
                && let Some(stride) = strides.get(&table)
                && descriptor.offset + descriptor.bytes_needed() as u64 > *stride
            {
                report.record_skip(
                    &descriptor.category,
                    &descriptor.display_name,
                    "span_exceeds_stride",
                );
                continue;
            }

            let key = (
                normalize_name(&descriptor.category),
                descriptor.normalized_name.clone(),
            );
            if fields.contains_key(&key) {
                report.record_skip(&descriptor.category, &descriptor.display_name, "duplicate");
                continue;
            }

            let descriptor = Arc::new(descriptor);
            categories
                .entry(key.0.clone())
                .or_default()
                .push(Arc::clone(&descriptor));
            fields.insert(key, descriptor);
            report.emitted += 1;
        }

        if !report.skips_by_reason.is_empty() {
            warn!(
                "Schema {}: skipped {} of {} entries ({:?})",
                version_label,
                report.skipped.len(),
                report.discovered,
                report.skips_by_reason
            );
        }

        let index = SchemaIndex {
            version_label: version_label.to_string(),
            fields,
            categories,
            strides,
            chains,
            parse_report: report,
        };
        validate_required(&index)?;
        Ok(index)
    }
}

fn validate_required(index: &SchemaIndex) -> Result<()> {
    for (table, category, name) in REQUIRED_FIELDS {
        let field = index.find(category, name).ok_or_else(|| {
            Error::SchemaInvalid(format!("required field {category}/{name} is missing"))
        })?;
        if !matches!(field.kind, FieldKind::Text { .. }) {
            return Err(Error::SchemaInvalid(format!(
                "required field {category}/{name} is not a text field"
            )));
        }
        if index.stride(*table).is_none() {
            return Err(Error::SchemaInvalid(format!(
                "missing stride ({}) for {table}",
                table.stride_key()
            )));
        }
    }
    for table in [TableKind::Player, TableKind::Team] {
        match index.stride(table) {
            Some(stride) if stride > 0 => {}
            _ => {
                return Err(Error::SchemaInvalid(format!(
                    "missing or zero stride for {table}"
                )));
            }
        }
    }
    Ok(())
}

/// Version keys are comma-separated label lists ("2K26,2K26DEMO"), matched
/// case-insensitively per token.
fn version_key_matches(raw_key: &str, target: &str) -> bool {
    let target = target.trim();
    if target.is_empty() {
        return false;
    }
    raw_key
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case(target))
}

fn parse_strides(info: &Value) -> HashMap<TableKind, u64> {
    let mut strides = HashMap::new();
    let Some(game_info) = info.get("game_info").and_then(Value::as_object) else {
        return strides;
    };
    for table in [
        TableKind::Player,
        TableKind::Team,
        TableKind::Staff,
        TableKind::Stadium,
    ] {
        if let Some(stride) = game_info.get(table.stride_key()).and_then(to_u64)
            && stride > 0
        {
            strides.insert(table, stride);
        }
    }
    strides
}

fn parse_base_pointers(info: &Value) -> HashMap<TableKind, Vec<PointerChainSpec>> {
    let mut chains: HashMap<TableKind, Vec<PointerChainSpec>> = HashMap::new();
    let Some(pointers) = info.get("base_pointers").and_then(Value::as_object) else {
        return chains;
    };
    for (key, value) in pointers {
        let Ok(table) = key.parse::<TableKind>() else {
            debug!("Ignoring base pointer for unknown table '{}'", key);
            continue;
        };
        let specs = chains.entry(table).or_default();
        match value {
            Value::Array(entries) => {
                for entry in entries {
                    match serde_json::from_value::<PointerChainSpec>(entry.clone()) {
                        Ok(spec) => specs.push(spec),
                        Err(e) => warn!("Bad pointer chain for {}: {}", table, e),
                    }
                }
            }
            Value::Object(_) => match serde_json::from_value::<PointerChainSpec>(value.clone()) {
                Ok(spec) => specs.push(spec),
                Err(e) => warn!("Bad pointer chain for {}: {}", table, e),
            },
            other => {
                // A bare number or hex string is a literal base.
                match to_u64(other) {
                    Some(address) if address != 0 => {
                        specs.push(PointerChainSpec::literal(address));
                    }
                    _ => warn!("Bad literal base for {}: {:?}", table, other),
                }
            }
        }
    }
    chains
}

fn parse_field_entry(
    entry: &Value,
    version_label: &str,
    report: &mut ParseReport,
) -> Option<FieldDescriptor> {
    let category = string_at(entry, &["category"]).unwrap_or_else(|| "Misc".to_string());
    let entry_name = string_at(entry, &["name", "display_name"]).unwrap_or_default();

    let Some(versions) = entry.get("versions").and_then(Value::as_object) else {
        report.record_skip(&category, &entry_name, "missing_versions");
        return None;
    };
    let Some(payload) = versions
        .iter()
        .find(|(key, _)| version_key_matches(key, version_label))
        .map(|(_, payload)| payload)
    else {
        report.record_skip(&category, &entry_name, "missing_target_version");
        return None;
    };

    let display_name = string_at(payload, &["name"]).unwrap_or(entry_name);
    if display_name.trim().is_empty() {
        report.record_skip(&category, "", "missing_name");
        return None;
    }
    let normalized_name = normalize_name(&display_name);
    let category = string_at(payload, &["category"]).unwrap_or(category);

    let Some(offset) = value_at(payload, &["address", "offset", "hex"]).and_then(to_u64) else {
        report.record_skip(&category, &display_name, "missing_address");
        return None;
    };

    let type_raw = string_at(payload, &["type"])
        .or_else(|| string_at(entry, &["type"]))
        .unwrap_or_default();
    let length = value_at(payload, &["length"]).and_then(to_u64).unwrap_or(0);
    let start_bit = value_at(payload, &["startBit", "start_bit"])
        .and_then(to_u64)
        .unwrap_or(0);
    if start_bit > 7 {
        report.record_skip(&category, &display_name, "invalid_start_bit");
        return None;
    }

    let values: Vec<String> = payload
        .get("values")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let (kind, length_bits) = match normalize_type(&type_raw) {
        "float" => {
            let bits = if length == 0 { 32 } else { length as u32 };
            if bits != 32 && bits != 64 {
                report.record_skip(&category, &display_name, "invalid_float_length");
                return None;
            }
            (FieldKind::Float, bits)
        }
        "pointer" => (FieldKind::Pointer, 64),
        "wstring" | "string" => {
            if length == 0 {
                report.record_skip(&category, &display_name, "missing_string_length");
                return None;
            }
            let encoding = if normalize_type(&type_raw) == "wstring" {
                TextEncoding::Utf16
            } else {
                TextEncoding::Ascii
            };
            (
                FieldKind::Text {
                    encoding,
                    max_chars: length as usize,
                },
                0,
            )
        }
        "integer" | "binary" => {
            let bits = if length > 0 {
                length as u32
            } else if normalize_type(&type_raw) == "binary" {
                1
            } else {
                32
            };
            if bits == 0 || bits > 64 {
                report.record_skip(&category, &display_name, "missing_length");
                return None;
            }
            if !values.is_empty() {
                (FieldKind::Enum { values }, bits)
            } else if normalize_type(&type_raw) == "binary" || start_bit != 0 || bits % 8 != 0 {
                (FieldKind::Bitfield, bits)
            } else {
                (FieldKind::Integer, bits)
            }
        }
        _ => {
            report.record_skip(&category, &display_name, "unknown_type");
            return None;
        }
    };

    let requires_deref = payload
        .get("requiresDereference")
        .or_else(|| payload.get("requires_deref"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let deref_offset = if requires_deref {
        value_at(payload, &["dereferenceAddress", "deref_offset"]).and_then(to_u64)
    } else {
        None
    };

    Some(FieldDescriptor {
        category,
        display_name,
        normalized_name,
        offset,
        start_bit: start_bit as u8,
        length_bits,
        kind,
        deref_offset,
    })
}

/// Collapse the type spellings seen in shipped schema files onto the
/// canonical tags.
fn normalize_type(raw: &str) -> &'static str {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.as_str() {
        "" | "integer" | "int" | "uint" | "number" | "slider" | "byte" | "short" => "integer",
        "float" | "single" | "double" => "float",
        "binary" | "bool" | "boolean" | "bit" | "bitfield" | "combo" | "enum" => "binary",
        "wstring" | "utf16" | "utf-16" | "wchar" | "wide" => "wstring",
        "string" | "text" | "ascii" | "char" | "cstring" => "string",
        _ if lower.contains("pointer") || lower == "ptr" || lower == "address" => "pointer",
        _ => "unknown",
    }
}

fn string_at(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn value_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(key))
}

/// Accepts JSON numbers, decimal strings, and `0x`-prefixed hex strings.
fn to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse::<u64>().ok()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_doc() -> String {
        r#"{
            "versions": {
                "2K26": {
                    "game_info": { "playerSize": 1176, "teamSize": 5672, "staffSize": 1000, "stadiumSize": 800 },
                    "base_pointers": {
                        "Player": [{ "rva": "0x5240CF0", "chain": [{ "offset": 0, "dereference": true }], "finalOffset": 0 }],
                        "Team": "0x22334455"
                    }
                }
            },
            "offsets": [
                { "category": "Vitals", "name": "First Name",
                  "versions": { "2K26": { "offset": "0x28", "length": 20, "type": "wstring" } } },
                { "category": "Vitals", "name": "Last Name",
                  "versions": { "2K26": { "offset": "0x0", "length": 20, "type": "wstring" } } },
                { "category": "Attributes", "name": "Three Point",
                  "versions": { "2K26": { "offset": 140, "startBit": 3, "length": 8, "type": "integer" } } },
                { "category": "Vitals", "name": "Height",
                  "versions": { "2K26": { "offset": 90, "length": 16, "type": "integer" } } },
                { "category": "Vitals", "name": "Old Only",
                  "versions": { "2K25": { "offset": 10, "length": 8 } } },
                { "category": "Vitals", "name": "No Address",
                  "versions": { "2K26": { "length": 8 } } },
                { "category": "Vitals", "name": "Position",
                  "versions": { "2K26": { "offset": 84, "length": 3, "type": "combo",
                                           "values": ["PG", "SG", "SF", "PF", "C"] } } }
            ]
        }"#
        .to_string()
    }

    #[test]
    fn test_load_selects_active_version() {
        let index = SchemaRepository::load_str(&sample_doc(), "2K26").unwrap();
        assert_eq!(index.parse_report().emitted, 5);

        let three = index.find("Attributes", "Three Point").unwrap();
        assert_eq!(three.offset, 140);
        assert_eq!(three.start_bit, 3);
        assert_eq!(three.length_bits, 8);
        assert_eq!(three.kind, FieldKind::Bitfield);

        let position = index.find("Vitals", "Position").unwrap();
        assert!(matches!(position.kind, FieldKind::Enum { ref values } if values.len() == 5));
    }

    #[test]
    fn test_skip_diagnostics_reported() {
        let index = SchemaRepository::load_str(&sample_doc(), "2K26").unwrap();
        let report = index.parse_report();
        assert_eq!(report.discovered, 7);
        assert_eq!(report.skips_by_reason.get("missing_target_version"), Some(&1));
        assert_eq!(report.skips_by_reason.get("missing_address"), Some(&1));
        assert!(
            report
                .skipped
                .iter()
                .any(|s| s.name == "Old Only" && s.reason == "missing_target_version")
        );
    }

    #[test]
    fn test_strides_and_chains() {
        let index = SchemaRepository::load_str(&sample_doc(), "2K26").unwrap();
        assert_eq!(index.stride(TableKind::Player), Some(1176));
        assert_eq!(index.stride(TableKind::Team), Some(5672));
        assert_eq!(index.chains(TableKind::Player).len(), 1);
        assert_eq!(index.chains(TableKind::Player)[0].rva, 0x5240CF0);
        // Literal team base becomes a direct-table chain.
        let team = &index.chains(TableKind::Team)[0];
        assert!(team.direct_table && team.absolute);
        assert_eq!(team.rva, 0x22334455);
    }

    #[test]
    fn test_missing_required_field_is_fatal() {
        let doc = r#"{
            "versions": { "2K26": { "game_info": { "playerSize": 1176, "teamSize": 5672 } } },
            "offsets": [
                { "category": "Vitals", "name": "First Name",
                  "versions": { "2K26": { "offset": 40, "length": 20, "type": "wstring" } } }
            ]
        }"#;
        let err = SchemaRepository::load_str(doc, "2K26").unwrap_err();
        assert!(matches!(err, Error::SchemaInvalid(_)), "got {err:?}");
    }

    #[test]
    fn test_missing_stride_is_fatal() {
        let doc = sample_doc().replace("\"playerSize\": 1176, ", "");
        let err = SchemaRepository::load_str(&doc, "2K26").unwrap_err();
        assert!(matches!(err, Error::SchemaInvalid(_)));
    }

    #[test]
    fn test_span_exceeding_stride_is_skipped() {
        let doc = sample_doc().replace("\"offset\": 140", "\"offset\": 1175");
        let index = SchemaRepository::load_str(&doc, "2K26").unwrap();
        assert!(index.find("Attributes", "Three Point").is_none());
        assert_eq!(
            index.parse_report().skips_by_reason.get("span_exceeds_stride"),
            Some(&1)
        );
    }

    #[test]
    fn test_version_key_token_lists() {
        assert!(version_key_matches("2K26,2K26DEMO", "2k26"));
        assert!(version_key_matches(" 2K25 , 2K26 ", "2K26"));
        assert!(!version_key_matches("2K25", "2K26"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_doc().as_bytes()).unwrap();
        let index = SchemaRepository::load(file.path(), "2K26").unwrap();
        assert!(index.find("Vitals", "LASTNAME").is_some());
    }
}
