//! Event flag groups shared between the dispatcher and waiting callers.

use core::task::{Context, Poll};

use embassy_sync::waitqueue::MultiWakerRegistration;

/// Concurrent waiters a single flag group can track before it wakes them all
/// to make room.
pub const FLAG_WAITERS: usize = 8;

/// `RDY` seen since the last power on
pub const READY: u32 = 1 << 0;
/// Incoming connection put on a backlog
pub const CONN_ACCEPT: u32 = 1 << 2;
/// `+QHTTPGET` / `+QHTTPPOST` result
pub const HTTP_RESPONSE: u32 = 1 << 19;
/// `+QHTTPREAD` result
pub const HTTP_READ: u32 = 1 << 20;
/// DNS lookup finished
pub const DNS: u32 = 1 << 21;
/// Ping reply or summary
pub const PING: u32 = 1 << 22;

const RX_DONE_SHIFT: u32 = 4;
const CONN_OPEN_SHIFT: u32 = 9;
const CONN_CLOSE_SHIFT: u32 = 14;

/// A whole packet for socket `n` is queued.
pub const fn rx_done(n: usize) -> u32 {
    1 << (RX_DONE_SHIFT + n as u32)
}

/// Connection of socket `n` opened (or failed to).
pub const fn conn_open(n: usize) -> u32 {
    1 << (CONN_OPEN_SHIFT + n as u32)
}

/// Connection of socket `n` went away.
pub const fn conn_close(n: usize) -> u32 {
    1 << (CONN_CLOSE_SHIFT + n as u32)
}

/// Every flag owned by socket `n`.
pub const fn socket_mask(n: usize) -> u32 {
    rx_done(n) | conn_open(n) | conn_close(n)
}

/// Producer marked a chunk ready, more to follow
pub const HANDOFF_PARTIAL: u32 = 1 << 0;
/// Producer marked the last chunk ready
pub const HANDOFF_COMPLETE: u32 = 1 << 1;
/// Consumer drained a chunk
pub const HANDOFF_CONSUMED: u32 = 1 << 2;
/// Transfer abandoned by either side
pub const HANDOFF_FAIL: u32 = 1 << 3;

/// Bitmask condition variable.
///
/// `set` wakes every registered waiter, each of which re-checks its own mask
/// and consumes the matching bits.
pub struct EventFlags {
    bits: u32,
    waker: MultiWakerRegistration<FLAG_WAITERS>,
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            bits: 0,
            waker: MultiWakerRegistration::new(),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn set(&mut self, mask: u32) {
        self.bits |= mask;
        self.waker.wake();
    }

    pub fn clear(&mut self, mask: u32) {
        self.bits &= !mask;
    }

    /// Take any of `mask` without waiting.
    pub fn take(&mut self, mask: u32) -> Option<u32> {
        let hit = self.bits & mask;
        if hit == 0 {
            return None;
        }
        self.bits &= !hit;
        Some(hit)
    }

    /// Take any of `mask`, registering `cx` when nothing is set yet.
    pub fn poll_take(&mut self, mask: u32, cx: &mut Context<'_>) -> Poll<u32> {
        match self.take(mask) {
            Some(hit) => Poll::Ready(hit),
            None => {
                self.waker.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl core::fmt::Debug for EventFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EventFlags({:#010x})", self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SOCKET_NUM;

    #[test]
    fn socket_bits_do_not_overlap() {
        let named = READY | CONN_ACCEPT | HTTP_RESPONSE | HTTP_READ | DNS | PING;
        let mut seen = named;
        for n in 0..SOCKET_NUM {
            assert_eq!(seen & socket_mask(n), 0, "socket {}", n);
            seen |= socket_mask(n);
        }
        assert_eq!(socket_mask(0).count_ones(), 3);
    }

    #[test]
    fn take_consumes_matching_bits_only() {
        let mut flags = EventFlags::new();
        flags.set(rx_done(1) | conn_close(1) | DNS);
        assert_eq!(flags.take(conn_open(1)), None);
        assert_eq!(
            flags.take(rx_done(1) | conn_close(1)),
            Some(rx_done(1) | conn_close(1))
        );
        assert_eq!(flags.bits(), DNS);
        flags.clear(DNS);
        assert_eq!(flags.bits(), 0);
    }

    #[test]
    fn pending_until_set() {
        let mut flags = EventFlags::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert_eq!(flags.poll_take(PING, &mut cx), Poll::Pending);
        flags.set(PING);
        assert_eq!(flags.poll_take(PING, &mut cx), Poll::Ready(PING));
        assert_eq!(flags.poll_take(PING, &mut cx), Poll::Pending);
    }

    struct NoopWake;

    impl std::task::Wake for NoopWake {
        fn wake(self: std::sync::Arc<Self>) {}
    }

    fn noop_waker() -> core::task::Waker {
        std::sync::Arc::new(NoopWake).into()
    }
}
