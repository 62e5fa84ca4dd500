//! Scratch buffer pool
//!
//! Fixed-capacity buffers are allocated once when the pool is built and
//! then lent out to one call at a time. Borrowing never waits and never
//! allocates: when every buffer is out, [`ScratchPool::try_get_buffer`]
//! returns `None` and the caller drops whatever it was about to emit.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A pool of pre-allocated scratch buffers
///
/// Cloning the pool is cheap; all clones share the same buffers.
#[derive(Clone)]
pub struct ScratchPool {
    /// Inner implementation wrapped in Arc for thread-safety
    inner: Arc<ScratchPoolInner>,
}

/// Inner implementation of the scratch pool
struct ScratchPoolInner {
    /// One permit per buffer in `free`
    semaphore: Arc<Semaphore>,
    /// Buffers not currently lent out
    free: Mutex<Vec<BytesMut>>,
    /// Length of every buffer in the pool
    buffer_capacity: usize,
    /// Number of buffers the pool was built with
    buffers: usize,
}

/// A buffer borrowed from the pool
///
/// The buffer always has `capacity()` addressable bytes. When dropped it is
/// handed back to the pool it came from.
pub struct ScratchBuffer {
    /// The actual buffer, `None` only while being returned
    buffer: Option<BytesMut>,
    /// The pool this buffer was borrowed from
    pool: ScratchPool,
    /// Released after the buffer is back in the free list
    _permit: OwnedSemaphorePermit,
}

impl ScratchPool {
    /// Create a new scratch pool
    ///
    /// # Parameters
    ///
    /// * `buffers` - Number of buffers that can be borrowed at once
    /// * `buffer_capacity` - Length of each buffer in bytes
    pub fn new(buffers: usize, buffer_capacity: usize) -> Self {
        let free = (0..buffers)
            .map(|_| BytesMut::zeroed(buffer_capacity))
            .collect();

        Self {
            inner: Arc::new(ScratchPoolInner {
                semaphore: Arc::new(Semaphore::new(buffers)),
                free: Mutex::new(free),
                buffer_capacity,
                buffers,
            }),
        }
    }

    /// Try to borrow a buffer from the pool without waiting
    ///
    /// # Returns
    ///
    /// Some(ScratchBuffer) if a buffer is available, None otherwise
    pub fn try_get_buffer(&self) -> Option<ScratchBuffer> {
        let permit = self.inner.semaphore.clone().try_acquire_owned().ok()?;
        let buffer = self.inner.free.lock().pop()?;

        Some(ScratchBuffer {
            buffer: Some(buffer),
            pool: self.clone(),
            _permit: permit,
        })
    }

    /// Length of every buffer handed out by this pool
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    /// Number of buffers currently available
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Total number of buffers owned by the pool
    pub fn size(&self) -> usize {
        self.inner.buffers
    }
}

impl fmt::Debug for ScratchPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchPool")
            .field("buffer_capacity", &self.inner.buffer_capacity)
            .field("buffers", &self.inner.buffers)
            .field("available", &self.available())
            .finish()
    }
}

impl ScratchBuffer {
    /// Number of addressable bytes in this buffer
    pub fn capacity(&self) -> usize {
        self.pool.inner.buffer_capacity
    }
}

impl Deref for ScratchBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.inner.free.lock().push(buffer);
        }
        // The permit is released after this, when the field is dropped
    }
}
