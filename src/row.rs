//! Fixed-width index record: the in-memory shape of one token.
//!
//! A row is always exactly [`ROW_SIZE`] bytes, stored little-endian as three
//! `u32` words. Row index and byte offset are therefore related by a
//! constant multiplier, mirroring how the teacher crate resolves a string
//! pool entry by a `u32` byte offset rather than by walking a list.

use std::convert::TryFrom;

/// Width of a single row, in bytes. Three 32-bit words.
pub const ROW_SIZE: u32 = 12;

/// Sentinel `size_or_length` value for a container row that hasn't closed yet.
pub const UNKNOWN_SIZE: i32 = -1;

// `packed` bit layout (MSB first):
//   bit 31           has_complex_children
//   bits 30..27 (4)   token-kind tag
//   bits 26..0  (27)  number_of_rows
const COMPLEX_BIT: u32 = 1 << 31;
const KIND_SHIFT: u32 = 27;
const KIND_MASK: u32 = 0b1111 << KIND_SHIFT;
const ROWS_MASK: u32 = (1 << KIND_SHIFT) - 1;

/// The closed set of structural/value tokens this format can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
  StartObject = 0,
  EndObject = 1,
  StartArray = 2,
  EndArray = 3,
  PropertyName = 4,
  String = 5,
  Number = 6,
  True = 7,
  False = 8,
  Null = 9,
}

impl TokenKind {
  /// A token occupies exactly one row iff it isn't a container marker or a
  /// property name (property names are "simple" in the row-width sense but
  /// are still paired with a following value row).
  pub fn is_simple(self) -> bool {
    !matches!(
      self,
      TokenKind::StartObject | TokenKind::StartArray | TokenKind::EndObject | TokenKind::EndArray
    )
  }

  pub fn is_container_start(self) -> bool {
    matches!(self, TokenKind::StartObject | TokenKind::StartArray)
  }

  fn from_tag(tag: u32) -> Self {
    match tag {
      0 => TokenKind::StartObject,
      1 => TokenKind::EndObject,
      2 => TokenKind::StartArray,
      3 => TokenKind::EndArray,
      4 => TokenKind::PropertyName,
      5 => TokenKind::String,
      6 => TokenKind::Number,
      7 => TokenKind::True,
      8 => TokenKind::False,
      9 => TokenKind::Null,
      other => unreachable!("bad token-kind tag {other}"),
    }
  }
}

/// One decoded index entry. `MetadataDb` stores these packed into bytes;
/// `Row` is the materialized view handed back by `MetadataDb::get`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Row {
  pub location: u32,
  pub size_or_length: i32,
  packed: u32,
}

impl Row {
  pub fn new(kind: TokenKind, location: u32, size_or_length: i32) -> Self {
    Row {
      location,
      size_or_length,
      packed: (kind as u32) << KIND_SHIFT,
    }
  }

  pub fn kind(&self) -> TokenKind {
    TokenKind::from_tag((self.packed & KIND_MASK) >> KIND_SHIFT)
  }

  pub fn has_complex_children(&self) -> bool {
    self.packed & COMPLEX_BIT != 0
  }

  pub fn set_has_complex_children(&mut self) {
    self.packed |= COMPLEX_BIT;
  }

  pub fn number_of_rows(&self) -> u32 {
    self.packed & ROWS_MASK
  }

  pub fn set_number_of_rows(&mut self, rows: u32) {
    debug_assert!(rows <= ROWS_MASK, "number_of_rows overflow: {rows}");
    self.packed = (self.packed & !ROWS_MASK) | (rows & ROWS_MASK);
  }

  /// Encodes this row as 12 little-endian bytes.
  pub fn to_bytes(self) -> [u8; ROW_SIZE as usize] {
    let mut out = [0u8; ROW_SIZE as usize];
    out[0..4].copy_from_slice(&self.location.to_le_bytes());
    out[4..8].copy_from_slice(&self.size_or_length.to_le_bytes());
    out[8..12].copy_from_slice(&self.packed.to_le_bytes());
    out
  }

  /// Decodes a row from a 12-byte little-endian slice.
  pub fn from_bytes(bytes: &[u8]) -> Self {
    debug_assert_eq!(bytes.len(), ROW_SIZE as usize);
    let location = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let size_or_length = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let packed = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    Row {
      location,
      size_or_length,
      packed,
    }
  }
}

/// Converts a byte offset into the DB's storage into a row index.
pub fn offset_to_index(offset: u32) -> u32 {
  offset / ROW_SIZE
}

/// Converts a row index into a byte offset into the DB's storage.
pub fn index_to_offset(index: u32) -> u32 {
  index * ROW_SIZE
}

pub fn row_count_for_len(len: usize) -> u32 {
  u32::try_from(len).expect("len exceeds u32::MAX") / ROW_SIZE
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_through_bytes() {
    let mut row = Row::new(TokenKind::StartArray, 42, UNKNOWN_SIZE);
    row.set_has_complex_children();
    row.set_number_of_rows(17);
    let bytes = row.to_bytes();
    let back = Row::from_bytes(&bytes);
    assert_eq!(back.kind(), TokenKind::StartArray);
    assert_eq!(back.location, 42);
    assert_eq!(back.size_or_length, UNKNOWN_SIZE);
    assert!(back.has_complex_children());
    assert_eq!(back.number_of_rows(), 17);
  }

  #[test]
  fn simple_token_classification() {
    assert!(TokenKind::String.is_simple());
    assert!(TokenKind::PropertyName.is_simple());
    assert!(!TokenKind::StartObject.is_simple());
    assert!(!TokenKind::EndArray.is_simple());
  }
}
