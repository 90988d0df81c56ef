//! Concrete tokenizer satisfying the contract `Parser` is driven by (§6.1).
//!
//! This is the "external collaborator" the distilled spec treats as a black
//! box; only the fields reported after a successful [`Tokenizer::read`] are
//! load-bearing for the rest of the crate. The lexical grammar implemented
//! here is JSON's (RFC 8259) number/string/literal grammar, since §1 defines
//! this format as "a superset that parses into the same token stream as
//! JSON" — KDL-specific syntax (bare identifiers, raw strings) is left for
//! a later layer.

use crate::error::{Error, Result};
use crate::row::TokenKind;

/// Whether `//`/`/* */` comments are tolerated in the input. Only `Allow` is
/// actually rejected today (§6.1, §6.3) — this format doesn't define comment
/// syntax yet, so `Disallow` and `Skip` behave identically. The three-way
/// enum is kept so a later KDL-comment layer has a stable setting to widen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentHandling {
  Disallow,
  Skip,
  Allow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Frame {
  Object,
  Array,
}

/// A byte cursor over a complete UTF-8 buffer. Call [`Tokenizer::read`] in a
/// loop; after it returns `Ok(true)`, the token fields below describe the
/// token just read.
pub struct Tokenizer<'a> {
  input: &'a [u8],
  pos: usize,
  stack: Vec<Frame>,
  /// Set once a property name has been read inside the current object
  /// frame and its value hasn't been seen yet.
  expect_value: bool,
  emitted_any: bool,

  pub kind: TokenKind,
  pub token_start_index: usize,
  pub value_span_length: usize,
  pub is_in_array: bool,
  pub value_is_escaped: bool,
  pub bytes_consumed: usize,
}

impl<'a> Tokenizer<'a> {
  pub fn new(input: &'a [u8], comments: CommentHandling) -> Result<Self> {
    if comments == CommentHandling::Allow {
      return Err(Error::NotSupported);
    }
    Ok(Tokenizer {
      input,
      pos: 0,
      stack: Vec::new(),
      expect_value: false,
      emitted_any: false,
      kind: TokenKind::Null,
      token_start_index: 0,
      value_span_length: 0,
      is_in_array: false,
      value_is_escaped: false,
      bytes_consumed: 0,
    })
  }

  /// Byte offset one past the last token consumed. Used by `Parser::parse`
  /// to assert the whole buffer was consumed (§4.1).
  pub fn position(&self) -> usize {
    self.pos
  }

  fn current_is_array(&self) -> bool {
    matches!(self.stack.last(), Some(Frame::Array))
  }

  fn err(&self, at: usize, message: impl Into<String>) -> Error {
    Error::InvalidKdl {
      offset: at,
      message: message.into(),
    }
  }

  fn skip_insignificant(&mut self) {
    while let Some(&b) = self.input.get(self.pos) {
      match b {
        b' ' | b'\t' | b'\r' | b'\n' | b',' => self.pos += 1,
        b':' | b'=' if self.expect_value => self.pos += 1,
        _ => break,
      }
    }
  }

  /// Advances and reports the next token. Returns `Ok(false)` at a clean
  /// end of input (no open containers, at least one token already seen, or
  /// the buffer was empty of structural content).
  pub fn read(&mut self) -> Result<bool> {
    let before = self.pos;
    self.skip_insignificant();

    // A document is a single value: once the top-level container has closed
    // (or a top-level scalar has been read), stop rather than attempt to
    // tokenize whatever follows. `Parser::parse`'s trailing-bytes check is
    // what turns the leftover, unconsumed content into `InvalidKdl`.
    if self.emitted_any && self.stack.is_empty() {
      self.bytes_consumed = self.pos - before;
      return Ok(false);
    }

    let Some(&byte) = self.input.get(self.pos) else {
      if !self.stack.is_empty() {
        return Err(self.err(self.pos, "unexpected end of input inside an open container"));
      }
      self.bytes_consumed = self.pos - before;
      return Ok(false);
    };

    let start = self.pos;
    let is_in_array = self.current_is_array();

    match byte {
      b'{' => {
        self.pos += 1;
        self.stack.push(Frame::Object);
        self.expect_value = false;
        self.emit(TokenKind::StartObject, start, 1, is_in_array, false);
      }
      b'}' => {
        if self.expect_value || !matches!(self.stack.last(), Some(Frame::Object)) {
          return Err(self.err(start, "unexpected '}'"));
        }
        self.stack.pop();
        self.pos += 1;
        self.restore_expect_value_for_object_parent();
        self.emit(TokenKind::EndObject, start, 1, is_in_array, false);
      }
      b'[' => {
        self.pos += 1;
        self.stack.push(Frame::Array);
        self.expect_value = false;
        self.emit(TokenKind::StartArray, start, 1, is_in_array, false);
      }
      b']' => {
        if !matches!(self.stack.last(), Some(Frame::Array)) {
          return Err(self.err(start, "unexpected ']'"));
        }
        self.stack.pop();
        self.pos += 1;
        self.restore_expect_value_for_object_parent();
        self.emit(TokenKind::EndArray, start, 1, is_in_array, false);
      }
      b'"' => {
        let (len, escaped) = self.scan_string(start)?;
        let in_object = matches!(self.stack.last(), Some(Frame::Object));
        let is_property = in_object && !self.expect_value;
        if is_property && is_in_array {
          unreachable!("an object frame can't report is_in_array");
        }
        if is_property {
          self.expect_value = true;
        } else if in_object {
          self.expect_value = false;
        }
        let kind = if is_property {
          TokenKind::PropertyName
        } else {
          TokenKind::String
        };
        // `token_start_index` stays at the opening quote here; `Parser`
        // skips it (`+ 1`) when it records the row's `location`.
        self.emit(kind, start, len, is_in_array, escaped);
      }
      b't' => self.scan_literal(start, b"true", TokenKind::True, is_in_array)?,
      b'f' => self.scan_literal(start, b"false", TokenKind::False, is_in_array)?,
      b'n' => self.scan_literal(start, b"null", TokenKind::Null, is_in_array)?,
      b'-' | b'0'..=b'9' => {
        let len = self.scan_number(start)?;
        self.after_value();
        self.emit(TokenKind::Number, start, len, is_in_array, false);
      }
      other => {
        return Err(self.err(start, format!("unexpected byte 0x{other:02x}")));
      }
    }

    self.emitted_any = true;
    self.bytes_consumed = self.pos - before;
    Ok(true)
  }

  fn after_value(&mut self) {
    if matches!(self.stack.last(), Some(Frame::Object)) {
      self.expect_value = false;
    }
  }

  /// When a nested container closes, the parent object (if any) is no
  /// longer mid-property — the container we just closed *was* the value.
  fn restore_expect_value_for_object_parent(&mut self) {
    self.after_value();
  }

  fn emit(
    &mut self,
    kind: TokenKind,
    value_start: usize,
    value_len: usize,
    is_in_array: bool,
    escaped: bool,
  ) {
    self.kind = kind;
    self.token_start_index = value_start;
    self.value_span_length = value_len;
    self.is_in_array = is_in_array;
    self.value_is_escaped = escaped;
  }

  fn scan_string(&mut self, quote_start: usize) -> Result<(usize, bool)> {
    let mut i = quote_start + 1;
    let mut escaped = false;
    loop {
      match self.input.get(i) {
        None => return Err(self.err(quote_start, "unterminated string")),
        Some(b'"') => {
          let len = i - (quote_start + 1);
          self.pos = i + 1;
          return Ok((len, escaped));
        }
        Some(b'\\') => {
          escaped = true;
          i = self.scan_escape(i)?;
        }
        Some(_) => i += 1,
      }
    }
  }

  fn scan_escape(&self, backslash_at: usize) -> Result<usize> {
    match self.input.get(backslash_at + 1) {
      Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't') => Ok(backslash_at + 2),
      Some(b'u') => {
        let digits = self.input.get(backslash_at + 2..backslash_at + 6).ok_or_else(|| {
          self.err(backslash_at, "truncated \\u escape")
        })?;
        if digits.iter().all(|b| b.is_ascii_hexdigit()) {
          Ok(backslash_at + 6)
        } else {
          Err(self.err(backslash_at, "invalid \\u escape: not 4 hex digits"))
        }
      }
      Some(other) => Err(self.err(backslash_at, format!("invalid escape '\\{}'", *other as char))),
      None => Err(self.err(backslash_at, "truncated escape at end of input")),
    }
  }

  fn scan_literal(
    &mut self,
    start: usize,
    text: &'static [u8],
    kind: TokenKind,
    is_in_array: bool,
  ) -> Result<()> {
    let end = start + text.len();
    if self.input.get(start..end) != Some(text) {
      return Err(self.err(start, format!("expected '{}'", std::str::from_utf8(text).unwrap())));
    }
    self.pos = end;
    self.after_value();
    self.emit(kind, start, text.len(), is_in_array, false);
    Ok(())
  }

  fn scan_number(&mut self, start: usize) -> Result<usize> {
    let mut i = start;
    if self.input.get(i) == Some(&b'-') {
      i += 1;
    }
    match self.input.get(i) {
      Some(b'0') => i += 1,
      Some(b'1'..=b'9') => {
        i += 1;
        while matches!(self.input.get(i), Some(b'0'..=b'9')) {
          i += 1;
        }
      }
      _ => return Err(self.err(start, "invalid number: expected a digit")),
    }
    if self.input.get(i) == Some(&b'.') {
      let frac_start = i + 1;
      let mut j = frac_start;
      while matches!(self.input.get(j), Some(b'0'..=b'9')) {
        j += 1;
      }
      if j == frac_start {
        return Err(self.err(start, "invalid number: digits required after '.'"));
      }
      i = j;
    }
    if matches!(self.input.get(i), Some(b'e' | b'E')) {
      let mut j = i + 1;
      if matches!(self.input.get(j), Some(b'+' | b'-')) {
        j += 1;
      }
      let exp_start = j;
      while matches!(self.input.get(j), Some(b'0'..=b'9')) {
        j += 1;
      }
      if j == exp_start {
        return Err(self.err(start, "invalid number: digits required in exponent"));
      }
      i = j;
    }
    self.pos = i;
    Ok(i - start)
  }

  pub fn emitted_any(&self) -> bool {
    self.emitted_any
  }
}
