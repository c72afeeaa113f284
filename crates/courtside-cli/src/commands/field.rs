use anyhow::Result;
use courtside_core::TableKind;

use crate::Args;

#[cfg(target_os = "windows")]
pub fn get(args: &Args, table: TableKind, index: u32, category: &str, field: &str) -> Result<()> {
    super::with_engine(args, false, |engine| {
        match engine.get(table, index, category, field) {
            Some(value) => println!("{}", engine.render_value(&value)),
            None => println!("(unavailable)"),
        }
        Ok(())
    })
}

#[cfg(target_os = "windows")]
pub fn set(
    args: &Args,
    table: TableKind,
    index: u32,
    category: &str,
    field: &str,
    raw: &str,
) -> Result<()> {
    use anyhow::bail;

    super::with_engine(args, true, |engine| {
        let Some(descriptor) = engine.schema().find(category, field).cloned() else {
            bail!("unknown field {category}/{field}");
        };
        let value = parse_value(&descriptor.kind, raw)?;
        if engine.set(table, index, category, field, &value) {
            println!("ok");
            Ok(())
        } else {
            bail!("write failed (see log)")
        }
    })
}

#[cfg(target_os = "windows")]
fn parse_value(
    kind: &courtside_core::FieldKind,
    raw: &str,
) -> Result<courtside_core::FieldValue> {
    use courtside_core::{FieldKind, FieldValue};

    let parse_u64 = |s: &str| -> Result<u64> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        Ok(parsed?)
    };

    Ok(match kind {
        FieldKind::Integer | FieldKind::Bitfield => FieldValue::Integer(parse_u64(raw)?),
        FieldKind::Float => FieldValue::Float(raw.trim().parse::<f64>()?),
        FieldKind::Text { .. } => FieldValue::Text(raw.to_string()),
        // Enum fields accept either an index or a label.
        FieldKind::Enum { .. } => match parse_u64(raw) {
            Ok(index) => FieldValue::Integer(index),
            Err(_) => FieldValue::Text(raw.to_string()),
        },
        FieldKind::Pointer => FieldValue::Pointer(parse_u64(raw)?),
    })
}

#[cfg(not(target_os = "windows"))]
pub fn get(
    _args: &Args,
    _table: TableKind,
    _index: u32,
    _category: &str,
    _field: &str,
) -> Result<()> {
    Err(super::unsupported())
}

#[cfg(not(target_os = "windows"))]
pub fn set(
    _args: &Args,
    _table: TableKind,
    _index: u32,
    _category: &str,
    _field: &str,
    _raw: &str,
) -> Result<()> {
    Err(super::unsupported())
}
