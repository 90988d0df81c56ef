//! Process-wide pooled byte storage.
//!
//! Two consumers rent from here: [`crate::document::Document`] for the
//! retained input buffer, and [`crate::metadata_db::MetadataDb`] for row
//! storage. Both return their rental on dispose; both zero the used range
//! first, since the buffer may still hold payload bytes (§5.2).
//!
//! This is the concrete form of "a process-wide byte-array pool" that the
//! design notes assume exists but leave unimplemented — a free list guarded
//! by a mutex, built on [`bytes::BytesMut`] for cheap, refcounted storage.

use std::sync::{Mutex, OnceLock};

use bytes::BytesMut;

/// Rentals above this size aren't worth pooling; they're dropped on return
/// rather than kept alive for a future caller that may never ask for one
/// this large again.
const MAX_POOLED_CAPACITY: usize = 1 << 20;

/// How many free buffers of any size the pool is willing to hold onto.
const MAX_FREE_LIST_LEN: usize = 64;

struct Pool {
  free: Mutex<Vec<BytesMut>>,
}

fn pool() -> &'static Pool {
  static POOL: OnceLock<Pool> = OnceLock::new();
  POOL.get_or_init(|| Pool {
    free: Mutex::new(Vec::new()),
  })
}

/// A buffer rented from the process-wide pool.
///
/// Dropping a `Rental` without calling [`Rental::zero_and_release`] simply
/// drops the backing storage — it is not returned to the pool. Callers that
/// want the bytes pooled for reuse must release explicitly, since only they
/// know when the data is no longer needed (the teacher's own resources are
/// all explicitly `Read`/closed rather than reclaimed by a destructor).
pub struct Rental {
  buf: BytesMut,
}

impl Rental {
  pub fn as_bytes_mut(&mut self) -> &mut BytesMut {
    &mut self.buf
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.buf
  }

  pub fn len(&self) -> usize {
    self.buf.len()
  }

  pub fn into_inner(self) -> BytesMut {
    self.buf
  }

  /// Zeroes the used range and returns the storage to the pool for reuse.
  pub fn zero_and_release(mut self) {
    self.buf.iter_mut().for_each(|b| *b = 0);
    release(self.buf);
  }
}

/// Rents at least `capacity` bytes of zeroed storage.
pub fn rent(capacity: usize) -> Rental {
  let mut buf = {
    let mut free = pool().free.lock().expect("pool mutex poisoned");
    let slot = free.iter().position(|b| b.capacity() >= capacity);
    match slot {
      Some(i) => free.swap_remove(i),
      None => BytesMut::new(),
    }
  };
  buf.clear();
  if buf.capacity() < capacity {
    buf.reserve(capacity - buf.capacity());
  }
  buf.resize(capacity, 0);
  Rental { buf }
}

/// Zeroes `buf`'s full capacity and returns it to the pool for reuse, if
/// it's small enough to be worth keeping around.
pub fn zero_and_release(mut buf: BytesMut) {
  let cap = buf.capacity();
  buf.resize(cap, 0);
  buf.iter_mut().for_each(|b| *b = 0);
  release(buf);
}

fn release(mut buf: BytesMut) {
  if buf.capacity() > MAX_POOLED_CAPACITY {
    return;
  }
  buf.clear();
  let mut free = pool().free.lock().expect("pool mutex poisoned");
  if free.len() < MAX_FREE_LIST_LEN {
    free.push(buf);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rented_storage_is_zeroed() {
    let rental = rent(16);
    assert_eq!(rental.len(), 16);
    assert!(rental.as_slice().iter().all(|&b| b == 0));
  }

  #[test]
  fn released_storage_can_be_reused() {
    let mut rental = rent(64);
    rental.as_bytes_mut()[0] = 0xAB;
    rental.zero_and_release();

    let reused = rent(32);
    assert!(reused.as_slice().iter().all(|&b| b == 0));
  }
}
