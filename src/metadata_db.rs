//! Append-only, growable index of [`Row`]s.
//!
//! Generalizes the teacher crate's `StringPoolChunk`: instead of a flat
//! `Vec<u32>` of string offsets resolved lazily against a strings blob, this
//! keeps a packed, fixed-width, tree-shaped index resolved lazily against
//! the document's byte buffer.

use bytes::BytesMut;

use crate::pool;
use crate::row::{self, Row, TokenKind, ROW_SIZE, UNKNOWN_SIZE};

/// `int32::MAX`, less one row, so that `length + ROW_SIZE` never overflows
/// `i32` while appending (§3.3).
const MAX_DB_BYTES: usize = i32::MAX as usize - ROW_SIZE as usize;

pub struct MetadataDb {
  storage: BytesMut,
  /// Bytes actually in use; always a multiple of `ROW_SIZE`.
  length: usize,
  pooled: bool,
}

impl MetadataDb {
  /// Starting capacity for a fresh DB: enough for a handful of tokens
  /// before the first growth, mirroring the teacher's habit of sizing
  /// initial `Vec`s off the smallest realistic input rather than reserving
  /// nothing.
  const INITIAL_ROWS: usize = 16;

  pub fn new() -> Self {
    let rental = pool::rent(Self::INITIAL_ROWS * ROW_SIZE as usize);
    MetadataDb {
      storage: rental.into_inner(),
      length: 0,
      pooled: true,
    }
  }

  pub fn row_count(&self) -> u32 {
    row::row_count_for_len(self.length)
  }

  pub fn len_bytes(&self) -> usize {
    self.length
  }

  fn ensure_capacity(&mut self, additional: usize) {
    if self.length + additional <= self.storage.len() {
      return;
    }
    let mut new_cap = self.storage.len().max(ROW_SIZE as usize);
    while new_cap < self.length + additional {
      new_cap *= 2;
    }
    new_cap = new_cap.min(MAX_DB_BYTES);
    assert!(
      new_cap >= self.length + additional,
      "metadata db exceeded the {MAX_DB_BYTES}-byte hard cap"
    );
    self.storage.resize(new_cap, 0);
  }

  /// Pushes a new row and returns its byte offset.
  pub fn append(&mut self, kind: TokenKind, location: u32, size_or_length: i32) -> u32 {
    self.ensure_capacity(ROW_SIZE as usize);
    let offset = self.length as u32;
    let row = Row::new(kind, location, size_or_length);
    self.storage[self.length..self.length + ROW_SIZE as usize].copy_from_slice(&row.to_bytes());
    self.length += ROW_SIZE as usize;
    offset
  }

  pub fn get(&self, row_byte_offset: u32) -> Row {
    let start = row_byte_offset as usize;
    Row::from_bytes(&self.storage[start..start + ROW_SIZE as usize])
  }

  fn with_row_mut<F: FnOnce(&mut Row)>(&mut self, row_byte_offset: u32, f: F) {
    let mut row = self.get(row_byte_offset);
    f(&mut row);
    let start = row_byte_offset as usize;
    self.storage[start..start + ROW_SIZE as usize].copy_from_slice(&row.to_bytes());
  }

  pub fn set_length(&mut self, row_byte_offset: u32, value: i32) {
    let start = row_byte_offset as usize;
    self.storage[start + 4..start + 8].copy_from_slice(&value.to_le_bytes());
  }

  pub fn set_number_of_rows(&mut self, row_byte_offset: u32, value: u32) {
    self.with_row_mut(row_byte_offset, |row| row.set_number_of_rows(value));
  }

  pub fn set_has_complex_children(&mut self, row_byte_offset: u32) {
    self.with_row_mut(row_byte_offset, |row| row.set_has_complex_children());
  }

  /// Scans backwards from the end for the most recent row of `kind` whose
  /// `size_or_length` is still [`UNKNOWN_SIZE`] — the still-open container
  /// that a matching `End*` token must close.
  pub fn find_index_of_first_unset_size_or_length(&self, kind: TokenKind) -> u32 {
    let mut offset = self.length;
    while offset >= ROW_SIZE as usize {
      offset -= ROW_SIZE as usize;
      let row = self.get(offset as u32);
      if row.kind() == kind && row.size_or_length == UNKNOWN_SIZE {
        return offset as u32;
      }
    }
    unreachable!("tokenizer emitted an End* token with no matching open Start*")
  }

  /// Trims (or returns) storage beyond what was actually used. Called once,
  /// after the last token of a successful parse.
  pub fn complete_allocations(&mut self) {
    self.storage.truncate(self.length);
  }

  /// Produces a new DB covering rows `[start_offset, end_offset)` of this
  /// one, rebasing every `location` so the copy's row 0 starts at byte 0 of
  /// the copied buffer.
  pub fn copy_segment(&self, start_offset: u32, end_offset: u32, new_buffer_base: u32) -> MetadataDb {
    let mut storage = BytesMut::new();
    storage.extend_from_slice(&self.storage[start_offset as usize..end_offset as usize]);
    for chunk_start in (0..storage.len()).step_by(ROW_SIZE as usize) {
      let bytes = &storage[chunk_start..chunk_start + ROW_SIZE as usize];
      let mut row = Row::from_bytes(bytes);
      row.location -= new_buffer_base;
      storage[chunk_start..chunk_start + ROW_SIZE as usize].copy_from_slice(&row.to_bytes());
    }
    let length = storage.len();
    MetadataDb {
      storage,
      length,
      pooled: false,
    }
  }

  /// Returns pooled storage, zeroing it first. A no-op for DBs that were
  /// never pool-backed (e.g. the result of `copy_segment`).
  pub fn dispose(self) {
    if self.pooled {
      pool::zero_and_release(self.storage);
    }
  }
}

impl Default for MetadataDb {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn append_and_get_round_trip() {
    let mut db = MetadataDb::new();
    let offset = db.append(TokenKind::Number, 3, 2);
    let row = db.get(offset);
    assert_eq!(row.kind(), TokenKind::Number);
    assert_eq!(row.location, 3);
    assert_eq!(row.size_or_length, 2);
  }

  #[test]
  fn grows_past_initial_capacity() {
    let mut db = MetadataDb::new();
    for i in 0..500u32 {
      db.append(TokenKind::Number, i, 1);
    }
    assert_eq!(db.row_count(), 500);
    for i in 0..500u32 {
      let row = db.get(row::index_to_offset(i));
      assert_eq!(row.location, i);
    }
  }

  #[test]
  fn finds_most_recently_opened_unclosed_container() {
    let mut db = MetadataDb::new();
    let obj_offset = db.append(TokenKind::StartObject, 0, UNKNOWN_SIZE);
    db.append(TokenKind::PropertyName, 1, 1);
    let arr_offset = db.append(TokenKind::StartArray, 2, UNKNOWN_SIZE);
    db.append(TokenKind::Number, 3, 1);

    assert_eq!(
      db.find_index_of_first_unset_size_or_length(TokenKind::StartArray),
      arr_offset
    );
    db.set_length(arr_offset, 1);
    assert_eq!(
      db.find_index_of_first_unset_size_or_length(TokenKind::StartObject),
      obj_offset
    );
  }

  #[test]
  fn copy_segment_rebases_locations() {
    let mut db = MetadataDb::new();
    db.append(TokenKind::Number, 100, 1); // unrelated row before the subtree
    let start = db.append(TokenKind::StartArray, 104, UNKNOWN_SIZE);
    db.append(TokenKind::Number, 105, 1);
    let end = db.append(TokenKind::EndArray, 106, 1);
    let end_offset = end + ROW_SIZE;

    let base_location = db.get(start).location;
    let copy = db.copy_segment(start, end_offset, base_location);
    assert_eq!(copy.row_count(), 3);
    assert_eq!(copy.get(0).location, 0);
    assert_eq!(copy.get(ROW_SIZE).location, 1);
  }
}
