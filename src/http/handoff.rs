//! Double buffered hand-off of HTTP response chunks.
//!
//! The dispatcher produces into one half while the caller drains the other.
//! A half is owned by the producer until it is marked ready and by the
//! consumer until it is drained, so the producer never overwrites bytes the
//! consumer has not seen. When both halves are owned by the consumer the
//! producer takes nothing and the dispatcher retries after the consumer
//! signals [`HANDOFF_CONSUMED`](crate::flags::HANDOFF_CONSUMED).

use core::cmp;

use crate::flags::{HANDOFF_COMPLETE, HANDOFF_PARTIAL};

/// Description of one drained chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkInfo {
    /// Zero based chunk counter
    pub index: u32,
    /// Bytes in this chunk
    pub size: usize,
    /// Declared bytes still to come after this chunk, `0` when no length was
    /// declared
    pub remaining: usize,
    /// Last chunk of the transfer
    pub last: bool,
}

pub struct ChunkHandoff<const N: usize> {
    halves: [[u8; N]; 2],
    lens: [usize; 2],
    ready: [bool; 2],
    write: usize,
    read: usize,
    /// Bytes still accepted from the producer, `None` until `finish`
    expected: Option<usize>,
    total: Option<usize>,
    delivered: usize,
    count: u32,
    active: bool,
    finished: bool,
}

impl<const N: usize> Default for ChunkHandoff<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ChunkHandoff<N> {
    pub const fn new() -> Self {
        Self {
            halves: [[0; N]; 2],
            lens: [0; 2],
            ready: [false; 2],
            write: 0,
            read: 0,
            expected: None,
            total: None,
            delivered: 0,
            count: 0,
            active: false,
            finished: false,
        }
    }

    pub fn reset(&mut self) {
        self.lens = [0; 2];
        self.ready = [false; 2];
        self.write = 0;
        self.read = 0;
        self.expected = None;
        self.total = None;
        self.delivered = 0;
        self.count = 0;
        self.active = false;
        self.finished = false;
    }

    /// Start a transfer of `limit` bytes, or until [`Self::finish`] when no
    /// limit is known.
    pub fn begin(&mut self, limit: Option<usize>) {
        self.reset();
        self.active = true;
        self.expected = limit;
        self.total = limit;
        self.finished = limit == Some(0);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// A length was declared with [`Self::begin`].
    pub fn is_bounded(&self) -> bool {
        self.total.is_some()
    }

    /// Everything produced has been drained and nothing more is accepted.
    pub fn is_complete(&self) -> bool {
        self.finished && !self.ready[self.read]
    }

    /// Abandon the transfer. Later data is discarded.
    pub fn fail(&mut self) {
        self.active = false;
        self.ready = [false; 2];
        self.lens = [0; 2];
    }

    /// Copy as much of `data` as the free half allows.
    ///
    /// Returns the number of bytes taken and the flags to raise for the
    /// consumer. Bytes past the limit, or arriving while inactive, are taken
    /// and dropped.
    pub fn produce(&mut self, data: &[u8]) -> (usize, u32) {
        if !self.active || self.finished {
            return (data.len(), 0);
        }

        let mut taken = 0;
        let mut signal = 0;
        while taken < data.len() && !self.finished {
            let w = self.write;
            if self.ready[w] {
                break;
            }
            let room = N - self.lens[w];
            let n = cmp::min(
                cmp::min(data.len() - taken, room),
                self.expected.unwrap_or(usize::MAX),
            );
            let start = self.lens[w];
            self.halves[w][start..start + n].copy_from_slice(&data[taken..taken + n]);
            self.lens[w] += n;
            taken += n;
            if let Some(expected) = self.expected.as_mut() {
                *expected -= n;
                if *expected == 0 {
                    self.finished = true;
                }
            }

            if self.lens[w] == N || self.finished {
                self.ready[w] = true;
                self.write ^= 1;
                signal |= if self.finished {
                    HANDOFF_COMPLETE
                } else {
                    HANDOFF_PARTIAL
                };
            }
        }

        if self.finished {
            taken = data.len();
        }
        (taken, signal)
    }

    /// The producer has nothing more. Flushes a partially filled half.
    pub fn finish(&mut self) -> u32 {
        if !self.active || self.finished {
            return 0;
        }
        self.finished = true;
        self.expected = Some(0);
        let w = self.write;
        if self.lens[w] > 0 && !self.ready[w] {
            self.ready[w] = true;
            self.write ^= 1;
        }
        HANDOFF_COMPLETE
    }

    /// Drain the next ready half into `out`. What does not fit is dropped.
    pub fn consume(&mut self, out: &mut [u8]) -> Option<(usize, ChunkInfo)> {
        let r = self.read;
        if !self.active || !self.ready[r] {
            return None;
        }
        let size = self.lens[r];
        let copied = cmp::min(size, out.len());
        out[..copied].copy_from_slice(&self.halves[r][..copied]);

        self.lens[r] = 0;
        self.ready[r] = false;
        self.read ^= 1;
        self.delivered += size;
        let index = self.count;
        self.count += 1;

        let info = ChunkInfo {
            index,
            size,
            remaining: self
                .total
                .map_or(0, |total| total.saturating_sub(self.delivered)),
            last: self.is_complete(),
        };
        Some((copied, info))
    }
}
