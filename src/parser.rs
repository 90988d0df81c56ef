//! Drives a [`Tokenizer`] to build a [`MetadataDb`] in one linear pass.
//!
//! This is a direct generalization of the teacher crate's chunk-dispatch
//! loop (`ArscParser`/`NomParser` walk a flat resource table and append one
//! entry per chunk) to an arbitrarily nested tree: the nesting is carried in
//! `stack`, and two row counters (`rows_for_members`, `rows_for_values`) are
//! threaded through so each container's `number_of_rows` ends up equal to
//! the number of rows separating its start row from the row one past its
//! matching end row.

use log::trace;

use crate::error::{Error, Result};
use crate::metadata_db::MetadataDb;
use crate::row::{TokenKind, UNKNOWN_SIZE};
use crate::tokenizer::{CommentHandling, Tokenizer};

/// `(saved_count, saved_rows)` restored when the container that pushed it
/// closes. `saved_rows` already has its own `+ 1` baked in at push time —
/// see the `StartObject`/`StartArray` arms below.
struct Frame {
  saved_count: u32,
  saved_rows: u32,
}

/// Parses `input` into a fresh, pool-backed [`MetadataDb`] rooted at byte
/// offset 0. Any tokenizer error is fatal; the partially-built DB is
/// released rather than returned.
pub fn parse(input: &[u8], comments: CommentHandling) -> Result<MetadataDb> {
  match parse_inner(input, comments) {
    Ok(db) => Ok(db),
    Err(e) => Err(e),
  }
}

fn parse_inner(input: &[u8], comments: CommentHandling) -> Result<MetadataDb> {
  let mut tokenizer = Tokenizer::new(input, comments)?;
  let mut db = MetadataDb::new();

  let mut array_items_or_property_count: u32 = 0;
  let mut rows_for_members: u32 = 0;
  let mut rows_for_values: u32 = 0;
  let mut stack: Vec<Frame> = Vec::new();

  while tokenizer.read()? {
    let kind = tokenizer.kind;
    let loc = tokenizer.token_start_index as u32;
    let in_array = tokenizer.is_in_array;

    match kind {
      TokenKind::StartObject => {
        if in_array {
          array_items_or_property_count += 1;
        }
        rows_for_values += 1;
        db.append(TokenKind::StartObject, loc, UNKNOWN_SIZE);
        stack.push(Frame {
          saved_count: array_items_or_property_count,
          saved_rows: rows_for_members + 1,
        });
        array_items_or_property_count = 0;
        rows_for_members = 0;
        trace!("parser: object opened at {loc}");
      }
      TokenKind::EndObject => {
        rows_for_members += 1;
        rows_for_values += 1;
        let start_offset = db.find_index_of_first_unset_size_or_length(TokenKind::StartObject);
        db.set_length(start_offset, array_items_or_property_count as i32);
        let end_offset = db.append(TokenKind::EndObject, loc, 1);
        db.set_number_of_rows(start_offset, rows_for_members);
        db.set_number_of_rows(end_offset, rows_for_members);
        let frame = stack.pop().expect("unbalanced object close");
        array_items_or_property_count = frame.saved_count;
        rows_for_members += frame.saved_rows;
        trace!(
          "parser: object closed at {loc}, {rows_for_members} rows, {} properties",
          db.get(start_offset).size_or_length
        );
      }
      TokenKind::StartArray => {
        if in_array {
          array_items_or_property_count += 1;
        }
        rows_for_members += 1;
        db.append(TokenKind::StartArray, loc, UNKNOWN_SIZE);
        stack.push(Frame {
          saved_count: array_items_or_property_count,
          saved_rows: rows_for_values + 1,
        });
        array_items_or_property_count = 0;
        rows_for_values = 0;
        trace!("parser: array opened at {loc}");
      }
      TokenKind::EndArray => {
        rows_for_members += 1;
        rows_for_values += 1;
        let start_offset = db.find_index_of_first_unset_size_or_length(TokenKind::StartArray);
        db.set_length(start_offset, array_items_or_property_count as i32);
        let has_complex_children = array_items_or_property_count + 1 != rows_for_values;
        let end_offset = db.append(TokenKind::EndArray, loc, 1);
        db.set_number_of_rows(start_offset, rows_for_values);
        db.set_number_of_rows(end_offset, rows_for_values);
        if has_complex_children {
          db.set_has_complex_children(start_offset);
        }
        let frame = stack.pop().expect("unbalanced array close");
        array_items_or_property_count = frame.saved_count;
        rows_for_values += frame.saved_rows;
        trace!(
          "parser: array closed at {loc}, {rows_for_values} rows, complex={has_complex_children}"
        );
      }
      TokenKind::PropertyName => {
        debug_assert!(!in_array, "tokenizer emitted a property name inside an array");
        let span_len = tokenizer.value_span_length;
        let offset = db.append(TokenKind::PropertyName, loc + 1, span_len as i32);
        if tokenizer.value_is_escaped {
          db.set_has_complex_children(offset);
        }
        array_items_or_property_count += 1;
        rows_for_members += 1;
        rows_for_values += 1;
      }
      TokenKind::String => {
        if in_array {
          array_items_or_property_count += 1;
        }
        let span_len = tokenizer.value_span_length;
        let offset = db.append(TokenKind::String, loc + 1, span_len as i32);
        if tokenizer.value_is_escaped {
          db.set_has_complex_children(offset);
        }
        rows_for_members += 1;
        rows_for_values += 1;
      }
      TokenKind::Number | TokenKind::True | TokenKind::False | TokenKind::Null => {
        if in_array {
          array_items_or_property_count += 1;
        }
        let span_len = tokenizer.value_span_length;
        db.append(kind, loc, span_len as i32);
        rows_for_members += 1;
        rows_for_values += 1;
      }
    }
  }

  if tokenizer.position() != input.len() {
    return Err(Error::InvalidKdl {
      offset: tokenizer.position(),
      message: "trailing bytes after the top-level value".to_string(),
    });
  }

  db.complete_allocations();
  Ok(db)
}
