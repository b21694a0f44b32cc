use core::cmp;

/// Fixed-capacity byte ring buffer backing a socket receive queue.
///
/// Written by the dispatcher from the data plane and drained by `recv`. All
/// operations are bounded by the current fill level or free space and never
/// panic on caller input: an oversized request is clamped.
#[derive(Debug)]
pub struct RingBuffer<const N: usize> {
    storage: [u8; N],
    read_at: usize,
    length: usize,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            storage: [0; N],
            read_at: 0,
            length: 0,
        }
    }

    /// Drop all queued bytes.
    pub fn clear(&mut self) {
        self.read_at = 0;
        self.length = 0;
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of bytes that can still be enqueued.
    pub fn window(&self) -> usize {
        N - self.length
    }

    fn get_idx(&self, idx: usize) -> usize {
        if N > 0 {
            (self.read_at + idx) % N
        } else {
            0
        }
    }

    fn contiguous_window(&self) -> usize {
        cmp::min(self.window(), N - self.get_idx(self.length))
    }

    fn enqueue_contiguous(&mut self, data: &[u8]) -> usize {
        if self.length == 0 {
            // Empty, restart at the front for the largest contiguous window.
            self.read_at = 0;
        }
        let write_at = self.get_idx(self.length);
        let size = cmp::min(self.contiguous_window(), data.len());
        self.storage[write_at..write_at + size].copy_from_slice(&data[..size]);
        self.length += size;
        size
    }

    /// Enqueue as much of `data` as fits and return the amount taken.
    pub fn enqueue_slice(&mut self, data: &[u8]) -> usize {
        let first = self.enqueue_contiguous(data);
        first + self.enqueue_contiguous(&data[first..])
    }

    /// Copy up to `data.len()` bytes starting `offset` bytes past the head,
    /// without dequeueing them.
    pub fn read_allocated(&self, offset: usize, data: &mut [u8]) -> usize {
        if offset >= self.length {
            return 0;
        }
        let size = cmp::min(self.length - offset, data.len());
        let start = self.get_idx(offset);
        let first = cmp::min(size, N - start);
        data[..first].copy_from_slice(&self.storage[start..start + first]);
        data[first..size].copy_from_slice(&self.storage[..size - first]);
        size
    }

    /// Discard up to `count` bytes from the head and return the amount
    /// discarded.
    pub fn dequeue_allocated(&mut self, count: usize) -> usize {
        let count = cmp::min(count, self.length);
        self.read_at = self.get_idx(count);
        self.length -= count;
        count
    }

    /// Dequeue as many bytes as fit into `data` and return the amount moved.
    pub fn dequeue_slice(&mut self, data: &mut [u8]) -> usize {
        let size = self.read_allocated(0, data);
        self.dequeue_allocated(size)
    }

    /// Little-endian `u16` at the head, if two bytes are queued.
    pub fn peek_u16(&self) -> Option<u16> {
        let mut raw = [0u8; 2];
        (self.read_allocated(0, &mut raw) == 2).then(|| u16::from_le_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_length_changes() {
        let mut ring = RingBuffer::<2>::new();
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 2);
        assert_eq!(ring.window(), 2);

        assert_eq!(ring.enqueue_slice(b"a"), 1);
        assert!(!ring.is_empty());
        assert_eq!(ring.window(), 1);

        assert_eq!(ring.enqueue_slice(b"bc"), 1);
        assert_eq!(ring.window(), 0);
    }

    #[test]
    fn slices_wrap_around() {
        let mut ring = RingBuffer::<12>::new();
        assert_eq!(ring.enqueue_slice(b"abcdefgh"), 8);
        let mut out = [0u8; 6];
        assert_eq!(ring.dequeue_slice(&mut out), 6);
        assert_eq!(&out, b"abcdef");

        // write crosses the end of storage
        assert_eq!(ring.enqueue_slice(b"ijklmnopqrst"), 10);
        assert_eq!(ring.len(), 12);

        let mut out = [0u8; 12];
        assert_eq!(ring.dequeue_slice(&mut out), 12);
        assert_eq!(&out, b"ghijklmnopqr");
        assert!(ring.is_empty());
    }

    #[test]
    fn peek_and_flush() {
        let mut ring = RingBuffer::<8>::new();
        assert_eq!(ring.peek_u16(), None);
        ring.enqueue_slice(&5u16.to_le_bytes());
        ring.enqueue_slice(b"hello");
        assert_eq!(ring.peek_u16(), Some(5));
        assert_eq!(ring.len(), 7);

        let mut out = [0u8; 3];
        assert_eq!(ring.read_allocated(2, &mut out), 3);
        assert_eq!(&out, b"hel");
        assert_eq!(ring.len(), 7);

        assert_eq!(ring.dequeue_allocated(4), 4);
        assert_eq!(ring.dequeue_allocated(100), 3);
        assert!(ring.is_empty());
        assert_eq!(ring.read_allocated(0, &mut out), 0);
    }
}
