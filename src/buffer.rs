//! Fixed-capacity byte ring buffer.
//!
//! # Responsibilities
//! - Stage bytes between the session API and the worker loops
//! - All-or-nothing writes (no partial message staging)
//! - Constant-space: one allocation at creation, never grows
//!
//! # Design Decisions
//! - No internal synchronization; the owning session wraps each buffer in a
//!   short mutex and never holds it across an await
//! - `read` into a caller slice returns the byte count (0 when empty, which
//!   is not an error)

/// Error returned when a write does not fit in the remaining space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull {
    /// Bytes the caller tried to stage.
    pub requested: usize,
    /// Bytes of free space at the time of the call.
    pub available: usize,
}

impl std::fmt::Display for BufferFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "buffer full: {} bytes requested, {} available",
            self.requested, self.available
        )
    }
}

impl std::error::Error for BufferFull {}

/// A fixed-capacity ring buffer of bytes.
///
/// Invariant: `available_read() + available_write() == capacity()` after
/// every operation.
#[derive(Debug)]
pub struct Buffer {
    storage: Vec<u8>,
    capacity: usize,
    size: usize,
    read_pos: usize,
    write_pos: usize,
}

impl Buffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity],
            capacity,
            size: 0,
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently staged and readable.
    pub fn available_read(&self) -> usize {
        self.size
    }

    /// Bytes of free space.
    pub fn available_write(&self) -> usize {
        self.capacity - self.size
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Stage `data` into the ring.
    ///
    /// All-or-nothing: when `data` does not fit in the free space the buffer
    /// is left untouched and `BufferFull` is returned.
    pub fn write(&mut self, data: &[u8]) -> Result<(), BufferFull> {
        let available = self.available_write();
        if data.len() > available {
            return Err(BufferFull {
                requested: data.len(),
                available,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        // Copy in up to two segments around the wrap point.
        let first = data.len().min(self.capacity - self.write_pos);
        self.storage[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.storage[..rest].copy_from_slice(&data[first..]);
        }

        self.write_pos = (self.write_pos + data.len()) % self.capacity;
        self.size += data.len();
        Ok(())
    }

    /// Copy up to `out.len()` staged bytes into `out`, in write order.
    ///
    /// Returns the number of bytes copied; 0 when the buffer is empty.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.size);
        if count == 0 {
            return 0;
        }

        let first = count.min(self.capacity - self.read_pos);
        out[..first].copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        let rest = count - first;
        if rest > 0 {
            out[first..count].copy_from_slice(&self.storage[..rest]);
        }

        self.read_pos = (self.read_pos + count) % self.capacity;
        self.size -= count;
        count
    }

    /// Drain everything currently staged into a fresh `Vec`.
    pub fn drain(&mut self) -> Vec<u8> {
        let mut out = vec![0u8; self.size];
        let copied = self.read(&mut out);
        debug_assert_eq!(copied, out.len());
        out
    }

    /// Discard all staged bytes and reset both ring positions.
    pub fn clear(&mut self) {
        self.size = 0;
        self.read_pos = 0;
        self.write_pos = 0;
    }
}
