//! Owns the parsed buffer and its index; the crate's entry point.

use std::sync::Mutex;

use bytes::BytesMut;
use log::debug;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::metadata_db::MetadataDb;
use crate::parser;
use crate::pool;
use crate::row::ROW_SIZE;
use crate::tokenizer::CommentHandling;

/// Largest input `Document::parse` accepts — row locations are `u32`, so
/// the buffer plus one trailing row must fit under `i32::MAX` (§3.3, §8).
const MAX_INPUT_BYTES: usize = i32::MAX as usize - ROW_SIZE as usize;

/// The actual guard `Document::parse` runs before touching `input` at all —
/// pulled out so tests can drive the rejection branch without allocating a
/// multi-gigabyte buffer just to get a `len()` past the cap.
fn check_input_size(len: usize) -> Result<()> {
  if len > MAX_INPUT_BYTES {
    return Err(Error::InputTooLarge { len });
  }
  Ok(())
}

struct State {
  buffer: BytesMut,
  db: MetadataDb,
  pooled: bool,
}

/// A parsed document: a UTF-8 byte buffer plus the [`MetadataDb`] index
/// over it. Cheap to query (every [`Element`] operation is a handful of
/// slice reads), expensive to build only once (`parse` does the actual
/// tokenize+index work).
///
/// Root documents returned by [`Document::parse`] are disposable: calling
/// [`Document::dispose`] releases pooled memory and every later operation
/// fails with [`Error::Disposed`]. Documents produced by
/// [`crate::element::Element::clone_subtree`] are not disposable —
/// `dispose` on one of those is a no-op, matching §3.5.
pub struct Document {
  state: Mutex<Option<State>>,
  disposable: bool,
}

impl Document {
  /// Parses `input` into a fresh, disposable document backed by pooled
  /// storage.
  pub fn parse(input: &[u8], comments: CommentHandling) -> Result<Self> {
    check_input_size(input.len())?;

    let mut rental = pool::rent(input.len());
    rental.as_bytes_mut().copy_from_slice(input);
    let buffer = rental.into_inner();

    let db = parser::parse(&buffer, comments)?;

    Ok(Document {
      state: Mutex::new(Some(State {
        buffer,
        db,
        pooled: true,
      })),
      disposable: true,
    })
  }

    /// Builds a document from already-parsed parts. Used by
    /// [`crate::element::Element::clone_subtree`] to wrap a rebased copy in
    /// a document that ignores `dispose()`.
  pub(crate) fn from_parts(buffer: BytesMut, db: MetadataDb, disposable: bool, pooled: bool) -> Self {
    Document {
      state: Mutex::new(Some(State { buffer, db, pooled })),
      disposable,
    }
  }

  /// An [`Element`] cursor over the root value (row 0).
  pub fn root(&self) -> Element<'_> {
    Element::new(self, 0)
  }

  /// Runs `f` with the document's buffer and DB, failing with
  /// [`Error::Disposed`] if `dispose()` already ran.
  pub(crate) fn with_state<R>(&self, f: impl FnOnce(&[u8], &MetadataDb) -> Result<R>) -> Result<R> {
    let guard = self.state.lock().expect("document mutex poisoned");
    match guard.as_ref() {
      Some(state) => f(&state.buffer, &state.db),
      None => Err(Error::Disposed),
    }
  }

  /// Releases pooled memory. Idempotent: the first caller to observe
  /// `Some` wins and performs the release; later callers (including
  /// concurrent ones, since the state is mutex-guarded) see `None` and
  /// return immediately. A no-op on non-disposable documents (clones).
  pub fn dispose(&self) {
    if !self.disposable {
      return;
    }
    let taken = {
      let mut guard = self.state.lock().expect("document mutex poisoned");
      guard.take()
    };
    if let Some(state) = taken {
      if state.pooled {
        pool::zero_and_release(state.buffer);
      }
      state.db.dispose();
      debug!("document disposed");
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.state.lock().expect("document mutex poisoned").is_none()
  }
}

impl Drop for Document {
  fn drop(&mut self) {
    self.dispose();
  }
}
