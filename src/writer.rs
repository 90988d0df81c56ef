//! The structural sink `Element::write_to` drives (§4.3).
//!
//! Kept as a plain trait rather than a concrete type so callers can bridge
//! into whatever serializer they already have; [`VecWriter`] is the
//! reference implementation used by this crate's own round-trip tests.

/// A structural rewrite sink. Every call corresponds 1:1 to a token kind
/// the tokenizer can emit; implementations don't see the source span, only
/// the logical (already-unescaped, for strings) payload.
pub trait Writer {
  type Error;

  fn write_start_object(&mut self) -> Result<(), Self::Error>;
  fn write_end_object(&mut self) -> Result<(), Self::Error>;
  fn write_start_array(&mut self) -> Result<(), Self::Error>;
  fn write_end_array(&mut self) -> Result<(), Self::Error>;
  fn write_property_name(&mut self, name: &[u8]) -> Result<(), Self::Error>;
  fn write_string_value(&mut self, value: &[u8]) -> Result<(), Self::Error>;
  /// `raw` is the number token's bytes verbatim — no parse/reformat, so a
  /// round trip never loses precision (§9a "writer number payload").
  fn write_number_value(&mut self, raw: &[u8]) -> Result<(), Self::Error>;
  fn write_boolean_value(&mut self, value: bool) -> Result<(), Self::Error>;
  fn write_null_value(&mut self) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Frame {
  Object { wrote_first: bool },
  Array { wrote_first: bool },
}

/// Renders structural calls back into KDL-ish (JSON-compatible) UTF-8 text.
pub struct VecWriter {
  out: Vec<u8>,
  stack: Vec<Frame>,
  /// Set after a property name, so the next value is preceded by `:` and
  /// not mistaken for the start of a new member.
  awaiting_value: bool,
}

impl VecWriter {
  pub fn new() -> Self {
    VecWriter {
      out: Vec::new(),
      stack: Vec::new(),
      awaiting_value: false,
    }
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.out
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.out
  }

  fn before_value(&mut self) {
    if self.awaiting_value {
      self.out.push(b':');
      self.awaiting_value = false;
      return;
    }
    match self.stack.last_mut() {
      Some(Frame::Array { wrote_first }) => {
        if *wrote_first {
          self.out.push(b',');
        }
        *wrote_first = true;
      }
      Some(Frame::Object { .. }) | None => {}
    }
  }

  fn write_escaped_str(&mut self, value: &[u8]) {
    self.out.push(b'"');
    for &b in value {
      match b {
        b'"' => self.out.extend_from_slice(b"\\\""),
        b'\\' => self.out.extend_from_slice(b"\\\\"),
        b'\n' => self.out.extend_from_slice(b"\\n"),
        b'\r' => self.out.extend_from_slice(b"\\r"),
        b'\t' => self.out.extend_from_slice(b"\\t"),
        0x08 => self.out.extend_from_slice(b"\\b"),
        0x0c => self.out.extend_from_slice(b"\\f"),
        b if b < 0x20 => {
          self.out.extend_from_slice(format!("\\u{b:04x}").as_bytes());
        }
        b => self.out.push(b),
      }
    }
    self.out.push(b'"');
  }
}

impl Default for VecWriter {
  fn default() -> Self {
    Self::new()
  }
}

impl Writer for VecWriter {
  type Error = std::convert::Infallible;

  fn write_start_object(&mut self) -> Result<(), Self::Error> {
    self.before_value();
    self.out.push(b'{');
    self.stack.push(Frame::Object { wrote_first: false });
    Ok(())
  }

  fn write_end_object(&mut self) -> Result<(), Self::Error> {
    self.stack.pop();
    self.out.push(b'}');
    Ok(())
  }

  fn write_start_array(&mut self) -> Result<(), Self::Error> {
    self.before_value();
    self.out.push(b'[');
    self.stack.push(Frame::Array { wrote_first: false });
    Ok(())
  }

  fn write_end_array(&mut self) -> Result<(), Self::Error> {
    self.stack.pop();
    self.out.push(b']');
    Ok(())
  }

  fn write_property_name(&mut self, name: &[u8]) -> Result<(), Self::Error> {
    if let Some(Frame::Object { wrote_first }) = self.stack.last_mut() {
      if *wrote_first {
        self.out.push(b',');
      }
      *wrote_first = true;
    }
    self.write_escaped_str(name);
    self.awaiting_value = true;
    Ok(())
  }

  fn write_string_value(&mut self, value: &[u8]) -> Result<(), Self::Error> {
    self.before_value();
    self.write_escaped_str(value);
    Ok(())
  }

  fn write_number_value(&mut self, raw: &[u8]) -> Result<(), Self::Error> {
    self.before_value();
    self.out.extend_from_slice(raw);
    Ok(())
  }

  fn write_boolean_value(&mut self, value: bool) -> Result<(), Self::Error> {
    self.before_value();
    self.out.extend_from_slice(if value { b"true" } else { b"false" });
    Ok(())
  }

  fn write_null_value(&mut self) -> Result<(), Self::Error> {
    self.before_value();
    self.out.extend_from_slice(b"null");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_flat_object() {
    let mut w = VecWriter::new();
    w.write_start_object().unwrap();
    w.write_property_name(b"a").unwrap();
    w.write_number_value(b"1").unwrap();
    w.write_property_name(b"b").unwrap();
    w.write_string_value(b"x").unwrap();
    w.write_end_object().unwrap();
    assert_eq!(w.into_bytes(), br#"{"a":1,"b":"x"}"#);
  }

  #[test]
  fn renders_array_with_commas() {
    let mut w = VecWriter::new();
    w.write_start_array().unwrap();
    w.write_number_value(b"1").unwrap();
    w.write_number_value(b"2").unwrap();
    w.write_end_array().unwrap();
    assert_eq!(w.into_bytes(), b"[1,2]");
  }

  #[test]
  fn escapes_string_payloads() {
    let mut w = VecWriter::new();
    w.write_string_value(b"a\nb\"c").unwrap();
    assert_eq!(w.into_bytes(), br#""a\nb\"c""#);
  }
}
