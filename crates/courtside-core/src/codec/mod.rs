//! Field decode/encode
//!
//! One field at a time: given a record address and a [`FieldDescriptor`],
//! pull the value out of remote memory or write it back. Bit-packed writes
//! are read-modify-write over exactly the span the bits occupy — bytes
//! outside the mask are never touched.
//!
//! Every remote-read failure here is recoverable: decode returns `None`
//! ("value unavailable"), never panics, and callers doing bulk scans treat
//! each field independently.

pub mod scale;

use std::fmt;

use encoding_rs::UTF_16LE;

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};
use crate::schema::{FieldDescriptor, FieldKind, TextEncoding};
use crate::table::ResolvedBase;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(u64),
    Float(f64),
    Text(String),
    Enum { index: u32, label: Option<String> },
    Pointer(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Enum { index, label } => match label {
                Some(label) => write!(f, "{label}"),
                None => write!(f, "{index}"),
            },
            FieldValue::Pointer(p) => write!(f, "{}", format_pointer(*p)),
        }
    }
}

/// Fixed-width hex rendering used for pointer fields.
pub fn format_pointer(ptr: u64) -> String {
    format!("0x{ptr:016X}")
}

/// Advisory rendering of a pointer field as a cross-table back-reference
/// ("Team #12"). Returns `None` when the pointer does not land exactly on
/// a record boundary of the table; callers fall back to hex.
pub fn render_back_reference(ptr: u64, table: &ResolvedBase) -> Option<String> {
    if ptr < table.address || table.stride == 0 {
        return None;
    }
    let delta = ptr - table.address;
    if delta % table.stride != 0 {
        return None;
    }
    let slot = delta / table.stride;
    (slot < table.table.max_records() as u64).then(|| format!("{} #{}", table.table, slot))
}

/// Absolute address of a field inside the record at `record_addr`,
/// following the embedded-struct pointer when the descriptor requires it.
/// A null struct pointer means the field is not currently resolvable.
pub fn field_address<R: ReadMemory>(
    reader: &R,
    record_addr: u64,
    field: &FieldDescriptor,
) -> Option<u64> {
    match field.deref_offset {
        Some(deref) => {
            let struct_ptr = reader.read_u64(record_addr + deref).ok()?;
            (struct_ptr != 0).then(|| struct_ptr + field.offset)
        }
        None => Some(record_addr + field.offset),
    }
}

/// Read a bit span: load `ceil((start_bit + length_bits)/8)` bytes
/// little-endian, shift out `start_bit`, mask to `length_bits`.
pub fn read_bits<R: ReadMemory>(
    reader: &R,
    addr: u64,
    start_bit: u8,
    length_bits: u32,
) -> Option<u64> {
    let bytes_needed = (start_bit as usize + length_bits as usize).div_ceil(8);
    let raw = reader.read_bytes(addr, bytes_needed).ok()?;
    let mut acc: u128 = 0;
    for (i, byte) in raw.iter().enumerate() {
        acc |= (*byte as u128) << (8 * i);
    }
    acc >>= start_bit;
    let mask = if length_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << length_bits) - 1
    };
    Some((acc & mask) as u64)
}

/// Write a bit span read-modify-write: only the masked bits change, every
/// other bit of the span (and every byte outside it) is preserved.
pub fn write_bits<W: WriteMemory>(
    writer: &W,
    addr: u64,
    start_bit: u8,
    length_bits: u32,
    value: u64,
) -> Result<()> {
    let bytes_needed = (start_bit as usize + length_bits as usize).div_ceil(8);
    let raw = writer.read_bytes(addr, bytes_needed)?;
    let mut current: u128 = 0;
    for (i, byte) in raw.iter().enumerate() {
        current |= (*byte as u128) << (8 * i);
    }

    let value_mask = if length_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << length_bits) - 1
    };
    let span_mask = value_mask << start_bit;
    let updated = (current & !span_mask) | (((value as u128) << start_bit) & span_mask);

    if updated == current {
        return Ok(());
    }
    let mut out = vec![0u8; bytes_needed];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = ((updated >> (8 * i)) & 0xFF) as u8;
    }
    writer.write_bytes(addr, &out)
}

/// Decode one field from the record at `record_addr`.
pub fn decode<R: ReadMemory>(
    reader: &R,
    record_addr: u64,
    field: &FieldDescriptor,
) -> Option<FieldValue> {
    let addr = field_address(reader, record_addr, field)?;
    match &field.kind {
        FieldKind::Integer | FieldKind::Bitfield => {
            read_bits(reader, addr, field.start_bit, field.length_bits).map(FieldValue::Integer)
        }
        FieldKind::Float => {
            if field.length_bits == 64 {
                reader.read_f64(addr).ok().map(FieldValue::Float)
            } else {
                reader.read_f32(addr).ok().map(|v| FieldValue::Float(v as f64))
            }
        }
        FieldKind::Text { encoding, max_chars } => {
            decode_text(reader, addr, *encoding, *max_chars).map(FieldValue::Text)
        }
        FieldKind::Enum { values } => {
            let raw = read_bits(reader, addr, field.start_bit, field.length_bits)?;
            let index = clamp_enum_index(raw, values.len(), field.max_raw());
            Some(FieldValue::Enum {
                index,
                label: values.get(index as usize).cloned(),
            })
        }
        FieldKind::Pointer => {
            let raw = reader.read_u64(addr).ok()?;
            Some(FieldValue::Pointer(raw & field.max_raw()))
        }
    }
}

/// Encode one field into the record at `record_addr`.
///
/// Integer-family values are masked to the declared width; enum values are
/// clamped; text fails rather than truncates.
pub fn encode<W: WriteMemory>(
    writer: &W,
    record_addr: u64,
    field: &FieldDescriptor,
    value: &FieldValue,
) -> Result<()> {
    let addr = field_address(writer, record_addr, field).ok_or(Error::MemoryWriteFailed {
        address: record_addr,
        message: "record struct pointer is null".to_string(),
    })?;

    match (&field.kind, value) {
        (FieldKind::Integer | FieldKind::Bitfield, FieldValue::Integer(v)) => {
            write_bits(writer, addr, field.start_bit, field.length_bits, *v)
        }
        (FieldKind::Float, FieldValue::Float(v)) => {
            if field.length_bits == 64 {
                writer.write_bytes(addr, &v.to_le_bytes())
            } else {
                writer.write_bytes(addr, &(*v as f32).to_le_bytes())
            }
        }
        (FieldKind::Text { encoding, max_chars }, FieldValue::Text(s)) => {
            encode_text(writer, addr, *encoding, *max_chars, s)
        }
        (FieldKind::Enum { values }, FieldValue::Integer(raw)) => {
            let index = clamp_enum_index(*raw, values.len(), field.max_raw());
            write_bits(writer, addr, field.start_bit, field.length_bits, index as u64)
        }
        (FieldKind::Enum { values }, FieldValue::Enum { index, .. }) => {
            let index = clamp_enum_index(*index as u64, values.len(), field.max_raw());
            write_bits(writer, addr, field.start_bit, field.length_bits, index as u64)
        }
        (FieldKind::Enum { values }, FieldValue::Text(label)) => {
            let index = values
                .iter()
                .position(|v| v.eq_ignore_ascii_case(label.trim()))
                .ok_or_else(|| Error::ValueOutOfRange(format!("unknown label '{label}'")))?;
            write_bits(writer, addr, field.start_bit, field.length_bits, index as u64)
        }
        (FieldKind::Pointer, FieldValue::Pointer(p) | FieldValue::Integer(p)) => {
            writer.write_bytes(addr, &(p & field.max_raw()).to_le_bytes())
        }
        (kind, value) => Err(Error::ValueOutOfRange(format!(
            "value {value:?} does not fit field kind {kind:?}"
        ))),
    }
}

fn clamp_enum_index(raw: u64, value_count: usize, max_raw: u64) -> u32 {
    let ceiling = (value_count.saturating_sub(1) as u64).min(max_raw);
    raw.min(ceiling) as u32
}

fn decode_text<R: ReadMemory>(
    reader: &R,
    addr: u64,
    encoding: TextEncoding,
    max_chars: usize,
) -> Option<String> {
    let raw = reader.read_bytes(addr, max_chars * encoding.char_width()).ok()?;
    Some(match encoding {
        TextEncoding::Ascii => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            raw[..end].iter().map(|&b| b as char).collect()
        }
        TextEncoding::Utf16 => {
            let end = raw
                .chunks_exact(2)
                .position(|pair| pair == [0, 0])
                .map(|units| units * 2)
                .unwrap_or(raw.len());
            let (decoded, _, _) = UTF_16LE.decode(&raw[..end]);
            decoded.into_owned()
        }
    })
}

fn encode_text<W: WriteMemory>(
    writer: &W,
    addr: u64,
    encoding: TextEncoding,
    max_chars: usize,
    value: &str,
) -> Result<()> {
    let mut buffer = vec![0u8; max_chars * encoding.char_width()];
    match encoding {
        TextEncoding::Ascii => {
            if !value.is_ascii() {
                return Err(Error::ValueOutOfRange(format!(
                    "'{value}' is not representable in an ASCII field"
                )));
            }
            if value.len() > max_chars {
                return Err(Error::TextTooLong { max_chars });
            }
            buffer[..value.len()].copy_from_slice(value.as_bytes());
        }
        TextEncoding::Utf16 => {
            let units: Vec<u16> = value.encode_utf16().collect();
            if units.len() > max_chars {
                return Err(Error::TextTooLong { max_chars });
            }
            for (i, unit) in units.iter().enumerate() {
                buffer[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
        }
    }
    writer.write_bytes(addr, &buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemory;
    use crate::table::TableKind;

    const RECORD: u64 = 0x2000;

    fn mock_record() -> MockMemory {
        MockMemory::builder().zeroed(0x1000, 0x2000).build()
    }

    fn bitfield(offset: u64, start_bit: u8, length_bits: u32) -> FieldDescriptor {
        FieldDescriptor {
            category: "Attributes".into(),
            display_name: "Three Point".into(),
            normalized_name: "THREEPOINT".into(),
            offset,
            start_bit,
            length_bits,
            kind: FieldKind::Bitfield,
            deref_offset: None,
        }
    }

    fn text_field(offset: u64, encoding: TextEncoding, max_chars: usize) -> FieldDescriptor {
        FieldDescriptor {
            category: "Vitals".into(),
            display_name: "Last Name".into(),
            normalized_name: "LASTNAME".into(),
            offset,
            start_bit: 0,
            length_bits: 0,
            kind: FieldKind::Text { encoding, max_chars },
            deref_offset: None,
        }
    }

    #[test]
    fn test_bitfield_round_trip_neighbors_untouched() {
        let mock = mock_record();
        // Surround the span with sentinel bytes.
        mock.write_bytes(RECORD, &[0xEE; 32]).unwrap();

        let field = bitfield(10, 3, 5);
        encode(&mock, RECORD, &field, &FieldValue::Integer(27)).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Integer(27))
        );

        let after = mock.read_bytes(RECORD, 32).unwrap();
        for (i, byte) in after.iter().enumerate() {
            if i == 10 {
                // 0xEE = 0b11101110; bits 3..8 replaced by 27 = 0b11011.
                assert_eq!(*byte, (0xEE & 0b0000_0111) | (27 << 3));
            } else {
                assert_eq!(*byte, 0xEE, "byte {} changed", i);
            }
        }
    }

    #[test]
    fn test_bitfield_spanning_bytes() {
        let mock = mock_record();
        let field = bitfield(4, 6, 11);
        let max = field.max_raw();
        encode(&mock, RECORD, &field, &FieldValue::Integer(max)).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Integer(max))
        );
        // Bits below start_bit stay clear.
        let first = mock.read_bytes(RECORD + 4, 1).unwrap()[0];
        assert_eq!(first & 0b0011_1111, 0);
    }

    #[test]
    fn test_integer_write_masks_to_width() {
        let mock = mock_record();
        let field = bitfield(0, 0, 4);
        encode(&mock, RECORD, &field, &FieldValue::Integer(0xFFFF)).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Integer(0xF))
        );
        assert_eq!(mock.read_bytes(RECORD + 1, 1).unwrap()[0], 0);
    }

    #[test]
    fn test_float_round_trip() {
        let mock = mock_record();
        let mut field = bitfield(16, 0, 32);
        field.kind = FieldKind::Float;
        encode(&mock, RECORD, &field, &FieldValue::Float(212.5)).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Float(212.5))
        );
    }

    #[test]
    fn test_utf16_text_round_trip_and_capacity() {
        let mock = mock_record();
        let field = text_field(0x40, TextEncoding::Utf16, 8);

        encode(&mock, RECORD, &field, &FieldValue::Text("Maxey".into())).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Text("Maxey".into()))
        );

        // Exactly max_chars round-trips (no terminator needed).
        encode(&mock, RECORD, &field, &FieldValue::Text("Wembanya".into())).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Text("Wembanya".into()))
        );

        // One past capacity fails instead of truncating, and leaves the
        // previous value intact.
        let err = encode(&mock, RECORD, &field, &FieldValue::Text("Wembanyama".into()));
        assert!(matches!(err, Err(Error::TextTooLong { max_chars: 8 })));
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Text("Wembanya".into()))
        );
    }

    #[test]
    fn test_ascii_text_rejects_non_ascii() {
        let mock = mock_record();
        let field = text_field(0x80, TextEncoding::Ascii, 12);
        encode(&mock, RECORD, &field, &FieldValue::Text("ARENA".into())).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Text("ARENA".into()))
        );
        assert!(encode(&mock, RECORD, &field, &FieldValue::Text("Arène".into())).is_err());
    }

    #[test]
    fn test_enum_label_and_index() {
        let mock = mock_record();
        let field = FieldDescriptor {
            kind: FieldKind::Enum {
                values: vec!["None".into(), "Bronze".into(), "Silver".into(), "Gold".into()],
            },
            ..bitfield(32, 2, 3)
        };

        encode(&mock, RECORD, &field, &FieldValue::Text("silver".into())).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Enum {
                index: 2,
                label: Some("Silver".into())
            })
        );

        // Raw writes clamp into the value table.
        encode(&mock, RECORD, &field, &FieldValue::Integer(99)).unwrap();
        assert_eq!(
            decode(&mock, RECORD, &field),
            Some(FieldValue::Enum {
                index: 3,
                label: Some("Gold".into())
            })
        );

        assert!(encode(&mock, RECORD, &field, &FieldValue::Text("Platinum".into())).is_err());
    }

    #[test]
    fn test_pointer_masked_and_rendered() {
        let mock = mock_record();
        let mut field = bitfield(0x60, 0, 48);
        field.kind = FieldKind::Pointer;
        encode(&mock, RECORD, &field, &FieldValue::Pointer(0xFFFF_1234_5678_9ABC)).unwrap();
        let decoded = decode(&mock, RECORD, &field).unwrap();
        assert_eq!(decoded, FieldValue::Pointer(0x0000_1234_5678_9ABC));
        assert_eq!(decoded.to_string(), "0x0000123456789ABC");
    }

    #[test]
    fn test_back_reference_rendering() {
        let base = ResolvedBase::new(TableKind::Team, 0x10000, 0x100);
        assert_eq!(
            render_back_reference(0x10300, &base),
            Some("Team #3".into())
        );
        // Misaligned or out-of-range pointers fall back to hex.
        assert_eq!(render_back_reference(0x10301, &base), None);
        assert_eq!(render_back_reference(0x0FFF0, &base), None);
    }

    #[test]
    fn test_deref_field_null_pointer_unavailable() {
        let mock = mock_record();
        let mut field = bitfield(4, 0, 8);
        field.deref_offset = Some(0x98);
        // Struct pointer at RECORD+0x98 is zero.
        assert_eq!(decode(&mock, RECORD, &field), None);
        assert!(encode(&mock, RECORD, &field, &FieldValue::Integer(1)).is_err());

        // Point it at a mapped struct and the field resolves.
        mock.write_bytes(RECORD + 0x98, &0x1100u64.to_le_bytes()).unwrap();
        encode(&mock, RECORD, &field, &FieldValue::Integer(42)).unwrap();
        assert_eq!(decode(&mock, RECORD, &field), Some(FieldValue::Integer(42)));
        assert_eq!(mock.read_bytes(0x1104, 1).unwrap()[0], 42);
    }

    #[test]
    fn test_unreadable_address_is_unavailable() {
        let mock = mock_record();
        let field = bitfield(0x10000, 0, 8);
        assert_eq!(decode(&mock, RECORD, &field), None);
    }
}
