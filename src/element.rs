//! A non-owning `(document, row_byte_offset)` cursor (§4.2).

use bytes::BytesMut;

use crate::convert::FromPayload;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::metadata_db::MetadataDb;
use crate::row::{Row, TokenKind, ROW_SIZE};
use crate::unescape;
use crate::writer::Writer;

/// A handle onto one row of a [`Document`]'s index. Never stores a decoded
/// payload itself — every accessor re-reads the document's buffer and DB
/// on each call, so an `Element` is as cheap to copy as the `(pointer, u32)`
/// pair it is.
#[derive(Clone, Copy)]
pub struct Element<'a> {
  doc: &'a Document,
  row_offset: u32,
}

impl<'a> Element<'a> {
  pub(crate) fn new(doc: &'a Document, row_offset: u32) -> Self {
    Element { doc, row_offset }
  }

  fn row(&self) -> Result<Row> {
    self.doc.with_state(|_, db| Ok(db.get(self.row_offset)))
  }

  fn expect(&self, expected: TokenKind, name: &'static str) -> Result<Row> {
    let row = self.row()?;
    if row.kind() != expected {
      return Err(Error::WrongKind {
        expected: name,
        found: row.kind(),
      });
    }
    Ok(row)
  }

  pub fn kind(&self) -> Result<TokenKind> {
    Ok(self.row()?.kind())
  }

  pub fn get_array_length(&self) -> Result<u32> {
    Ok(self.expect(TokenKind::StartArray, "StartArray")?.size_or_length.max(0) as u32)
  }

  pub fn get_property_count(&self) -> Result<u32> {
    Ok(self.expect(TokenKind::StartObject, "StartObject")?.size_or_length.max(0) as u32)
  }

  /// The name row of the `index`-th property of this object. Objects have
  /// no `has_complex_children` shortcut (only arrays and strings do), so
  /// every lookup walks from the first property.
  pub fn get_property_name_at(&self, index: u32) -> Result<Element<'a>> {
    let row = self.expect(TokenKind::StartObject, "StartObject")?;
    let count = row.size_or_length.max(0) as u32;
    if index >= count {
      return Err(Error::IndexOutOfRange {
        index: index as usize,
        length: count as usize,
      });
    }
    self.doc.with_state(|_, db| {
      let mut name_offset = self.row_offset + ROW_SIZE;
      for _ in 0..index {
        let value_offset = name_offset + ROW_SIZE;
        name_offset = next_sibling(db, value_offset);
      }
      Ok(Element::new(self.doc, name_offset))
    })
  }

  /// The value row paired with `get_property_name_at(index)`.
  pub fn get_property_value_at(&self, index: u32) -> Result<Element<'a>> {
    let name = self.get_property_name_at(index)?;
    Ok(Element::new(self.doc, name.row_offset + ROW_SIZE))
  }

  /// Property lookup by name (§1): returns the value element of the first
  /// property whose name matches, or `None` if there isn't one.
  pub fn get_property(&self, name: &str) -> Result<Option<Element<'a>>> {
    let row = self.expect(TokenKind::StartObject, "StartObject")?;
    let count = row.size_or_length.max(0) as u32;
    for index in 0..count {
      let name_el = self.get_property_name_at(index)?;
      if name_el.text_equals(name, true)? {
        return Ok(Some(Element::new(self.doc, name_el.row_offset + ROW_SIZE)));
      }
    }
    Ok(None)
  }

  pub fn get_array_element(&self, k: u32) -> Result<Element<'a>> {
    let row = self.expect(TokenKind::StartArray, "StartArray")?;
    let len = row.size_or_length.max(0) as u32;
    if k >= len {
      return Err(Error::IndexOutOfRange {
        index: k as usize,
        length: len as usize,
      });
    }
    if !row.has_complex_children() {
      return Ok(Element::new(self.doc, self.row_offset + (k + 1) * ROW_SIZE));
    }
    self.doc.with_state(|_, db| {
      let mut pos = self.row_offset + ROW_SIZE;
      for _ in 0..k {
        pos = next_sibling(db, pos);
      }
      Ok(Element::new(self.doc, pos))
    })
  }

  /// `self + ROW_SIZE` for a simple value; `self + number_of_rows * ROW_SIZE`
  /// (the row's own matching `End*`) for a container, plus one more row if
  /// `include_end`.
  pub fn get_end_index(&self, include_end: bool) -> Result<u32> {
    let row = self.row()?;
    let end = if row.kind().is_simple() {
      self.row_offset + ROW_SIZE
    } else {
      self.row_offset + row.number_of_rows() * ROW_SIZE
    };
    Ok(if include_end { end + ROW_SIZE } else { end })
  }

  pub fn get_raw_value(&self, include_quotes: bool) -> Result<Vec<u8>> {
    self.doc.with_state(|buf, db| {
      let row = db.get(self.row_offset);
      let (mut start, mut end) = if row.kind().is_simple() {
        let start = row.location as usize;
        let end = start + row.size_or_length.max(0) as usize;
        (start, end)
      } else {
        let end_offset = self.row_offset + row.number_of_rows() * ROW_SIZE;
        let end_row = db.get(end_offset);
        (row.location as usize, end_row.location as usize + end_row.size_or_length.max(0) as usize)
      };
      if include_quotes && matches!(row.kind(), TokenKind::String | TokenKind::PropertyName) {
        start -= 1;
        end += 1;
      }
      Ok(buf[start..end].to_vec())
    })
  }

  /// `self` must be the row of a property's *value*; the property-name row
  /// immediately precedes it. Returns the span covering both, including
  /// the name's quotes and the value's quotes if it's a string.
  pub fn get_property_raw_value(&self) -> Result<Vec<u8>> {
    self.doc.with_state(|buf, db| {
      let value_row = db.get(self.row_offset);
      let name_offset = self.row_offset.checked_sub(ROW_SIZE).ok_or(Error::WrongKind {
        expected: "PropertyName",
        found: value_row.kind(),
      })?;
      let name_row = db.get(name_offset);
      if name_row.kind() != TokenKind::PropertyName {
        return Err(Error::WrongKind {
          expected: "PropertyName",
          found: name_row.kind(),
        });
      }
      let start = name_row.location as usize - 1;
      let mut end = if value_row.kind().is_simple() {
        value_row.location as usize + value_row.size_or_length.max(0) as usize
      } else {
        let end_offset = self.row_offset + value_row.number_of_rows() * ROW_SIZE;
        let end_row = db.get(end_offset);
        end_row.location as usize + end_row.size_or_length.max(0) as usize
      };
      if value_row.kind() == TokenKind::String {
        end += 1;
      }
      Ok(buf[start..end].to_vec())
    })
  }

  pub fn get_string(&self) -> Result<Option<String>> {
    self.doc.with_state(|buf, db| {
      let row = db.get(self.row_offset);
      match row.kind() {
        TokenKind::Null => Ok(None),
        TokenKind::String => Ok(Some(string_payload(buf, &row)?)),
        other => Err(Error::WrongKind {
          expected: "String",
          found: other,
        }),
      }
    })
  }

  /// Zero-allocation comparison against `other`. Asserts the row is a
  /// `String` or `PropertyName`, like every other typed accessor in this
  /// file. `should_unescape` controls whether a stored segment with
  /// escapes is decoded before comparing, or simply fails the comparison
  /// at the raw-byte level.
  pub fn text_equals(&self, other: &str, should_unescape: bool) -> Result<bool> {
    self.doc.with_state(|buf, db| {
      let row = db.get(self.row_offset);
      if !matches!(row.kind(), TokenKind::String | TokenKind::PropertyName) {
        return Err(Error::WrongKind {
          expected: "String",
          found: row.kind(),
        });
      }
      let start = row.location as usize;
      let len = row.size_or_length.max(0) as usize;
      let raw = &buf[start..start + len];
      let other_bytes = other.as_bytes();
      if other_bytes.len() > raw.len() {
        return Ok(false);
      }
      if !should_unescape {
        return Ok(other_bytes.len() == raw.len() && raw == other_bytes);
      }
      if row.has_complex_children() {
        unescape::text_equals(raw, other)
      } else {
        Ok(raw == other_bytes)
      }
    })
  }

  /// Converts this element's value to `T`. Returns `Ok(None)` if the row
  /// kind doesn't match `T::accepts`, the payload is too short to be
  /// valid, or the parse fails/doesn't consume the whole payload — all
  /// conversion failures are reported this way rather than as an `Err`
  /// (§6.3 "two-valued result").
  pub fn try_get_value<T: FromPayload>(&self) -> Result<Option<T>> {
    self.doc.with_state(|buf, db| {
      let row = db.get(self.row_offset);
      if !T::accepts(row.kind()) {
        return Ok(None);
      }
      let start = row.location as usize;
      let len = row.size_or_length.max(0) as usize;
      if let Some(min_len) = T::min_len() {
        if len < min_len {
          return Ok(None);
        }
      }
      let raw = &buf[start..start + len];
      let text = if row.has_complex_children() {
        unescape::unescape(raw)?
      } else {
        std::str::from_utf8(raw)
          .map_err(|_| Error::InvalidKdl {
            offset: start,
            message: "invalid UTF-8".to_string(),
          })?
          .to_string()
      };
      Ok(T::parse(&text))
    })
  }

  /// A fresh, non-disposable document covering this subtree: a copy of
  /// `get_raw_value(true)` as the buffer, rebased row storage as the DB.
  pub fn clone_subtree(&self) -> Result<Document> {
    let bytes = self.get_raw_value(true)?;
    self.doc.with_state(|_, db| {
      let start_offset = self.row_offset;
      let start_row = db.get(start_offset);
      let end_offset = if start_row.kind().is_simple() {
        start_offset + ROW_SIZE
      } else {
        start_offset + (start_row.number_of_rows() + 1) * ROW_SIZE
      };
      let copy: MetadataDb = db.copy_segment(start_offset, end_offset, start_row.location);
      let buffer = BytesMut::from(&bytes[..]);
      Ok(Document::from_parts(buffer, copy, false, false))
    })
  }

  pub fn write_to<W: Writer>(&self, writer: &mut W) -> std::result::Result<(), WriteError<W::Error>> {
    let outcome = self
      .doc
      .with_state(|buf, db| Ok(write_row_inner(buf, db, self.row_offset, writer)));
    match outcome {
      Ok(inner) => inner,
      Err(e) => Err(WriteError::Document(e)),
    }
  }
}

/// Advances from a child's row offset to its next sibling's, skipping the
/// child's entire subtree if it's a container.
fn next_sibling(db: &MetadataDb, offset: u32) -> u32 {
  let row = db.get(offset);
  if row.kind().is_simple() {
    offset + ROW_SIZE
  } else {
    offset + (1 + row.number_of_rows()) * ROW_SIZE
  }
}

fn string_payload(buf: &[u8], row: &Row) -> Result<String> {
  let start = row.location as usize;
  let end = start + row.size_or_length.max(0) as usize;
  let raw = &buf[start..end];
  if row.has_complex_children() {
    unescape::unescape(raw)
  } else {
    std::str::from_utf8(raw)
      .map(str::to_string)
      .map_err(|_| Error::InvalidKdl {
        offset: start,
        message: "invalid UTF-8".to_string(),
      })
  }
}

/// Failure from [`Element::write_to`]: either the document was disposed
/// mid-walk, or the sink itself failed.
#[derive(thiserror::Error, Debug)]
pub enum WriteError<E> {
  #[error(transparent)]
  Document(Error),
  #[error("writer error: {0:?}")]
  Writer(E),
}

fn write_row_inner<W: Writer>(
  buf: &[u8],
  db: &MetadataDb,
  offset: u32,
  w: &mut W,
) -> std::result::Result<(), WriteError<W::Error>> {
  let row = db.get(offset);
  match row.kind() {
    TokenKind::StartObject => {
      w.write_start_object().map_err(WriteError::Writer)?;
      let count = row.size_or_length.max(0) as u32;
      let mut name_offset = offset + ROW_SIZE;
      for _ in 0..count {
        let name_row = db.get(name_offset);
        let name = string_payload(buf, &name_row).map_err(WriteError::Document)?;
        w.write_property_name(name.as_bytes()).map_err(WriteError::Writer)?;
        let value_offset = name_offset + ROW_SIZE;
        write_row_inner(buf, db, value_offset, w)?;
        name_offset = next_sibling(db, value_offset);
      }
      w.write_end_object().map_err(WriteError::Writer)
    }
    TokenKind::StartArray => {
      w.write_start_array().map_err(WriteError::Writer)?;
      let count = row.size_or_length.max(0) as u32;
      let mut child_offset = offset + ROW_SIZE;
      for _ in 0..count {
        write_row_inner(buf, db, child_offset, w)?;
        child_offset = next_sibling(db, child_offset);
      }
      w.write_end_array().map_err(WriteError::Writer)
    }
    TokenKind::String => {
      let s = string_payload(buf, &row).map_err(WriteError::Document)?;
      w.write_string_value(s.as_bytes()).map_err(WriteError::Writer)
    }
    TokenKind::Number => {
      let start = row.location as usize;
      let end = start + row.size_or_length.max(0) as usize;
      w.write_number_value(&buf[start..end]).map_err(WriteError::Writer)
    }
    TokenKind::True => w.write_boolean_value(true).map_err(WriteError::Writer),
    TokenKind::False => w.write_boolean_value(false).map_err(WriteError::Writer),
    TokenKind::Null => w.write_null_value().map_err(WriteError::Writer),
    TokenKind::PropertyName | TokenKind::EndObject | TokenKind::EndArray => {
      unreachable!("write_row_inner called directly on a {:?} row", row.kind())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::CommentHandling;
  use crate::writer::VecWriter;

  #[test]
  fn reads_flat_object_fields() {
    let doc = Document::parse(br#"{"a":1,"b":"x"}"#, CommentHandling::Disallow).unwrap();
    let root = doc.root();
    assert_eq!(root.get_property_count().unwrap(), 2);
  }

  #[test]
  fn array_element_access_simple_and_complex() {
    let doc = Document::parse(b"[1,2,3]", CommentHandling::Disallow).unwrap();
    let root = doc.root();
    assert_eq!(root.get_array_element(2).unwrap().try_get_value::<i64>().unwrap(), Some(3));

    let doc2 = Document::parse(br#"[1,[2,3],4]"#, CommentHandling::Disallow).unwrap();
    let root2 = doc2.root();
    let third = root2.get_array_element(2).unwrap();
    assert_eq!(third.try_get_value::<i64>().unwrap(), Some(4));
  }

  #[test]
  fn index_out_of_range_fails() {
    let doc = Document::parse(b"[1]", CommentHandling::Disallow).unwrap();
    let err = doc.root().get_array_element(5).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { .. }));
  }

  #[test]
  fn get_string_unescapes_lazily() {
    let doc = Document::parse(br#""a\nb""#, CommentHandling::Disallow).unwrap();
    assert_eq!(doc.root().get_string().unwrap(), Some("a\nb".to_string()));
  }

  #[test]
  fn text_equals_against_escaped_value() {
    let doc = Document::parse(br#""a\nb""#, CommentHandling::Disallow).unwrap();
    assert!(doc.root().text_equals("a\nb", true).unwrap());
    assert!(!doc.root().text_equals("a\nb", false).unwrap());
  }

  #[test]
  fn text_equals_on_a_non_string_row_fails_instead_of_byte_comparing() {
    let doc = Document::parse(b"1", CommentHandling::Disallow).unwrap();
    let err = doc.root().text_equals("1", true).unwrap_err();
    assert!(matches!(err, Error::WrongKind { expected: "String", .. }));
  }

  #[test]
  fn clone_subtree_survives_parent_dispose() {
    let doc = Document::parse(br#"[1,[2,3],4]"#, CommentHandling::Disallow).unwrap();
    let array_el = doc.root().get_array_element(1).unwrap();
    let clone = array_el.clone_subtree().unwrap();
    doc.dispose();

    let clone_root = clone.root();
    assert_eq!(clone_root.get_array_length().unwrap(), 2);
    assert_eq!(clone_root.get_array_element(0).unwrap().try_get_value::<i64>().unwrap(), Some(2));
  }

  #[test]
  fn property_raw_value_spans_name_and_value() {
    let doc = Document::parse(br#"{"a":1,"b":"x"}"#, CommentHandling::Disallow).unwrap();
    let root = doc.root();
    let a_value = root.get_property_value_at(0).unwrap();
    assert_eq!(a_value.get_property_raw_value().unwrap(), br#""a":1"#);
    let b_value = root.get_property_value_at(1).unwrap();
    assert_eq!(b_value.get_property_raw_value().unwrap(), br#""b":"x""#);
  }

  #[test]
  fn property_raw_value_on_root_fails_instead_of_panicking() {
    let doc = Document::parse(br#"{"a":1}"#, CommentHandling::Disallow).unwrap();
    let err = doc.root().get_property_raw_value().unwrap_err();
    assert!(matches!(err, Error::WrongKind { expected: "PropertyName", .. }));
  }

  #[test]
  fn property_raw_value_on_array_element_fails_instead_of_panicking() {
    let doc = Document::parse(b"[1,2]", CommentHandling::Disallow).unwrap();
    let second = doc.root().get_array_element(1).unwrap();
    let err = second.get_property_raw_value().unwrap_err();
    assert!(matches!(err, Error::WrongKind { expected: "PropertyName", .. }));
  }

  #[test]
  fn property_lookup_by_name_and_index() {
    let doc = Document::parse(br#"{"a":1,"b":"x"}"#, CommentHandling::Disallow).unwrap();
    let root = doc.root();

    let first_name = root.get_property_name_at(0).unwrap();
    assert!(first_name.text_equals("a", true).unwrap());
    assert_eq!(root.get_property_value_at(0).unwrap().try_get_value::<i64>().unwrap(), Some(1));

    let b = root.get_property("b").unwrap().unwrap();
    assert_eq!(b.get_string().unwrap(), Some("x".to_string()));

    assert!(root.get_property("missing").unwrap().is_none());
  }

  #[test]
  fn write_to_round_trips_structure() {
    let doc = Document::parse(br#"{"a":1,"b":[true,false,null]}"#, CommentHandling::Disallow).unwrap();
    let mut writer = VecWriter::new();
    doc.root().write_to(&mut writer).unwrap();
    assert_eq!(writer.into_bytes(), br#"{"a":1,"b":[true,false,null]}"#);
  }
}
