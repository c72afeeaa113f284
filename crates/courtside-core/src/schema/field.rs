use serde::{Deserialize, Serialize};

/// Encodings a fixed-capacity text field can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    Ascii,
    Utf16,
}

impl TextEncoding {
    /// Bytes per character slot.
    pub fn char_width(&self) -> usize {
        match self {
            TextEncoding::Ascii => 1,
            TextEncoding::Utf16 => 2,
        }
    }
}

/// Type tag of a field, with per-type payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Integer,
    Float,
    Bitfield,
    Text {
        encoding: TextEncoding,
        max_chars: usize,
    },
    Enum {
        values: Vec<String>,
    },
    Pointer,
}

/// Where and how one field is packed inside a record.
///
/// Immutable once loaded; owned by the schema index and shared by
/// reference with the codec and record views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub category: String,
    pub display_name: String,
    pub normalized_name: String,
    /// Byte offset from the record start (or from the dereferenced struct
    /// when `deref_offset` is set).
    pub offset: u64,
    /// Bit offset inside the first byte, 0..=7.
    pub start_bit: u8,
    pub length_bits: u32,
    pub kind: FieldKind,
    /// Offset of an embedded struct pointer the field lives behind.
    pub deref_offset: Option<u64>,
}

impl FieldDescriptor {
    /// Bytes the bit span occupies: `ceil((start_bit + length_bits) / 8)`.
    pub fn bytes_needed(&self) -> usize {
        match &self.kind {
            FieldKind::Text { encoding, max_chars } => max_chars * encoding.char_width(),
            _ => (self.start_bit as usize + self.length_bits as usize).div_ceil(8),
        }
    }

    /// Largest raw value the bit span can hold.
    pub fn max_raw(&self) -> u64 {
        if self.length_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.length_bits) - 1
        }
    }
}

/// Canonical lookup key form: alphanumerics only, uppercased.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
