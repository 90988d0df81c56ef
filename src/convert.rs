//! Typed conversions `Element::try_get_value` delegates to.
//!
//! Numbers go through `core::str::FromStr`, dates through `chrono`, byte
//! arrays through `base64` — all established crates, per §2/§9a, rather
//! than hand-rolled parsers. The one hand-rolled piece is [`Guid`]: its "D"
//! format is a single fixed 36-byte grammar, the kind of fixed-layout
//! parsing the teacher itself writes by hand, and no example repo in the
//! pack depends on a GUID crate.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::row::TokenKind;

/// What `Element::try_get_value::<T>()` needs to know about `T`: which row
/// kind it reads from, a cheap up-front length gate for types with a known
/// minimum length, and the actual parse (which must consume the full
/// payload to succeed).
pub trait FromPayload: Sized {
  const EXPECTED_KIND: &'static str;

  fn accepts(kind: TokenKind) -> bool;

  /// An up-front length below which `parse` is guaranteed to fail, so
  /// callers can skip invoking it (§4.2, §6.3: "length pre-checks fail
  /// fast" for dates/GUIDs). `None` means no useful gate exists.
  fn min_len() -> Option<usize> {
    None
  }

  fn parse(text: &str) -> Option<Self>;
}

macro_rules! numeric_from_str {
  ($($t:ty),+) => {
    $(
      impl FromPayload for $t {
        const EXPECTED_KIND: &'static str = "Number";

        fn accepts(kind: TokenKind) -> bool {
          kind == TokenKind::Number
        }

        fn parse(text: &str) -> Option<Self> {
          <$t as FromStr>::from_str(text).ok()
        }
      }
    )+
  };
}

numeric_from_str!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, f32, f64);

/// A parsed "D"-format GUID (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`),
/// stored as the 16 bytes obtained by reading its 32 hex digits in
/// document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

const GUID_LEN: usize = 36;
const GUID_HYPHENS: [usize; 4] = [8, 13, 18, 23];

impl FromPayload for Guid {
  const EXPECTED_KIND: &'static str = "String";

  fn accepts(kind: TokenKind) -> bool {
    kind == TokenKind::String
  }

  fn min_len() -> Option<usize> {
    Some(GUID_LEN)
  }

  fn parse(text: &str) -> Option<Self> {
    let bytes = text.as_bytes();
    if bytes.len() != GUID_LEN {
      return None;
    }
    if GUID_HYPHENS.iter().any(|&i| bytes[i] != b'-') {
      return None;
    }
    let mut out = [0u8; 16];
    let mut out_i = 0;
    let mut i = 0;
    while i < GUID_LEN {
      if GUID_HYPHENS.contains(&i) {
        i += 1;
        continue;
      }
      let hi = (bytes[i] as char).to_digit(16)?;
      let lo = (bytes[i + 1] as char).to_digit(16)?;
      out[out_i] = ((hi << 4) | lo) as u8;
      out_i += 1;
      i += 2;
    }
    debug_assert_eq!(out_i, 16);
    Some(Guid(out))
  }
}

/// `DateTime` per §6.1's glossary entry: no offset, parsed via `chrono`'s
/// RFC 3339 support.
impl FromPayload for NaiveDateTime {
  const EXPECTED_KIND: &'static str = "String";

  fn accepts(kind: TokenKind) -> bool {
    kind == TokenKind::String
  }

  fn min_len() -> Option<usize> {
    Some("YYYY-MM-DDTHH:MM:SS".len())
  }

  fn parse(text: &str) -> Option<Self> {
    DateTime::parse_from_rfc3339(text)
      .map(|dt| dt.naive_utc())
      .ok()
      .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok())
  }
}

/// `DateTimeOffset`: RFC 3339 with its offset preserved.
impl FromPayload for DateTime<FixedOffset> {
  const EXPECTED_KIND: &'static str = "String";

  fn accepts(kind: TokenKind) -> bool {
    kind == TokenKind::String
  }

  fn min_len() -> Option<usize> {
    Some("YYYY-MM-DDTHH:MM:SSZ".len())
  }

  fn parse(text: &str) -> Option<Self> {
    DateTime::parse_from_rfc3339(text).ok()
  }
}

/// Base64-encoded byte arrays.
impl FromPayload for Vec<u8> {
  const EXPECTED_KIND: &'static str = "String";

  fn accepts(kind: TokenKind) -> bool {
    kind == TokenKind::String
  }

  fn parse(text: &str) -> Option<Self> {
    STANDARD.decode(text).ok()
  }
}
