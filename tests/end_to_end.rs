//! Concrete end-to-end scenarios exercised across the whole public API,
//! mirroring how `bxmlrs`'s own integration tests parse a complete
//! document and assert on the result rather than on individual methods.

use anyhow::{Context, Result};
use kdl_core::{CommentHandling, Document, Error};

#[test]
fn flat_object_with_two_properties() -> Result<()> {
  let doc =
    Document::parse(br#"{"a":1,"b":"x"}"#, CommentHandling::Disallow).context("parsing a flat object")?;
  let root = doc.root();
  assert_eq!(root.get_property_count()?, 2);

  let a_name = root.get_property_name_at(0)?;
  assert!(a_name.text_equals("a", true)?);
  let a_value = root.get_property_value_at(0)?;
  assert_eq!(a_value.try_get_value::<i32>()?, Some(1));

  let b_value = root.get_property("b")?.context("property b should exist")?;
  assert_eq!(b_value.get_string()?, Some("x".to_string()));
  Ok(())
}

#[test]
fn simple_array_uses_direct_indexing() -> Result<()> {
  let doc = Document::parse(b"[1,2,3]", CommentHandling::Disallow)?;
  let root = doc.root();
  assert_eq!(root.get_array_length()?, 3);
  let third = root.get_array_element(2)?;
  assert_eq!(third.try_get_value::<i64>()?, Some(3));
  Ok(())
}

#[test]
fn array_with_nested_container_is_complex_and_still_walkable() -> Result<()> {
  let doc = Document::parse(br#"[1,[2,3],4]"#, CommentHandling::Disallow)?;
  let root = doc.root();
  assert_eq!(root.get_array_length()?, 3);
  let nested = root.get_array_element(1)?;
  assert_eq!(nested.get_array_length()?, 2);
  let last = root.get_array_element(2)?;
  assert_eq!(last.try_get_value::<i64>()?, Some(4));
  Ok(())
}

#[test]
fn escaped_string_round_trips_through_unescape() -> Result<()> {
  let doc = Document::parse(br#""a\nb""#, CommentHandling::Disallow)?;
  let root = doc.root();
  assert_eq!(root.get_string()?, Some("a\nb".to_string()));
  let raw = root.get_raw_value(true)?;
  assert_eq!(raw, br#""a\nb""#);
  Ok(())
}

#[test]
fn empty_array_has_two_rows_and_zero_length() -> Result<()> {
  let doc = Document::parse(b"[]", CommentHandling::Disallow)?;
  let root = doc.root();
  assert_eq!(root.get_array_length()?, 0);
  assert_eq!(root.get_end_index(false)?, 12);
  Ok(())
}

#[test]
fn clone_subtree_outlives_parent_dispose() -> Result<()> {
  let doc = Document::parse(br#"[1,[2,3],4]"#, CommentHandling::Disallow)?;
  let nested = doc.root().get_array_element(1)?;
  let clone = nested.clone_subtree().context("cloning the nested array")?;
  doc.dispose();

  let clone_root = clone.root();
  assert_eq!(clone_root.get_array_length()?, 2);
  assert_eq!(clone_root.get_array_element(1)?.try_get_value::<i64>()?, Some(3));
  Ok(())
}

#[test]
fn disposed_document_rejects_every_operation() -> Result<()> {
  let doc = Document::parse(b"[1,2,3]", CommentHandling::Disallow)?;
  doc.dispose();
  assert!(doc.is_disposed());
  match doc.root().kind() {
    Err(Error::Disposed) => {}
    other => panic!("expected Disposed, got {other:?}"),
  }
  Ok(())
}

#[test]
fn comment_handling_allow_is_rejected_up_front() {
  let err = Document::parse(b"[1]", CommentHandling::Allow).unwrap_err();
  assert_eq!(err, Error::NotSupported);
}

#[test]
fn write_to_is_a_faithful_structural_round_trip() -> Result<()> {
  use kdl_core::VecWriter;
  let source: &[u8] = br#"{"a":1,"b":[true,false,null],"c":"x\\y"}"#;
  let doc = Document::parse(source, CommentHandling::Disallow)?;
  let mut writer = VecWriter::new();
  doc.root().write_to(&mut writer).context("writing the document back out")?;
  let rendered = writer.into_bytes();

  let reparsed =
    Document::parse(&rendered, CommentHandling::Disallow).context("re-parsing the rendered output")?;
  assert_eq!(reparsed.root().get_property_count()?, doc.root().get_property_count()?);
  assert_eq!(
    reparsed.root().get_property("a")?.unwrap().try_get_value::<i64>()?,
    doc.root().get_property("a")?.unwrap().try_get_value::<i64>()?
  );
  Ok(())
}

#[test]
fn trailing_garbage_after_the_top_level_value_is_rejected() {
  let err = Document::parse(b"[1] garbage", CommentHandling::Disallow).unwrap_err();
  assert!(matches!(err, Error::InvalidKdl { .. }));
}

#[test]
fn a_second_syntactically_valid_top_level_value_is_also_rejected() {
  // Without a "one value per document" check, a naive tokenizer would
  // happily read straight through into a second top-level array.
  let err = Document::parse(b"[1] [2]", CommentHandling::Disallow).unwrap_err();
  assert!(matches!(err, Error::InvalidKdl { .. }));
}

#[test]
fn out_of_range_array_access_reports_bounds() -> Result<()> {
  let doc = Document::parse(b"[1]", CommentHandling::Disallow)?;
  match doc.root().get_array_element(3) {
    Err(Error::IndexOutOfRange { index: 3, length: 1 }) => Ok(()),
    other => anyhow::bail!("expected IndexOutOfRange, got {other:?}"),
  }
}
