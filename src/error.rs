use thiserror::Error;

/// Every public failure this crate can produce.
///
/// Conversion failures (`Element::try_get_value`) are reported as an
/// `Option`, not through this enum — see §7 of the design notes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("object disposed")]
  Disposed,

  #[error("index {index} out of range (length {length})")]
  IndexOutOfRange { index: usize, length: usize },

  #[error("wrong kind: expected {expected}, found {found:?}")]
  WrongKind {
    expected: &'static str,
    found: crate::row::TokenKind,
  },

  #[error("invalid KDL at byte {offset}: {message}")]
  InvalidKdl { offset: usize, message: String },

  #[error("comment handling 'allow' is not supported")]
  NotSupported,

  #[error("input of {len} bytes exceeds the maximum supported size")]
  InputTooLarge { len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
