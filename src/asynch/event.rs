use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use heapless::Vec;
use no_std_net::Ipv4Addr;

use super::state;

/// Depth of the transport to runner event queue.
pub const EVENT_CHANNEL_CAPACITY: usize = 8;
/// Largest payload slice carried by a single data event.
pub const EVENT_CHUNK_SIZE: usize = 256;

pub type Chunk = Vec<u8, EVENT_CHUNK_SIZE>;

pub(crate) type EventChannel = Channel<NoopRawMutex, Event, EVENT_CHANNEL_CAPACITY>;

/// Connection details reported with an opened connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub conn_id: u8,
    /// Accepted by a listener rather than opened locally
    pub server: bool,
    /// `<connectID>` of the accepting listener
    pub server_id: Option<u8>,
    pub local_port: u16,
    pub remote: Option<(Ipv4Addr, u16)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HttpResponseInfo {
    pub err: u16,
    pub status: Option<u16>,
    pub content_length: Option<u32>,
}

/// Everything the dispatcher reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Transport activity, nothing to update
    Execute,
    Ready,
    ConnectionOpened(LinkInfo),
    /// Minimal open notification when link info is polled
    ControlConnectionOpened { conn_id: u8 },
    ConnectionFailed { conn_id: u8, err: u16 },
    ConnectionClosed { conn_id: u8 },
    /// A `len` byte packet for `conn_id` follows as [`Event::RxData`]
    RxHeader { conn_id: u8, len: u16 },
    RxData(Chunk),
    HttpResponse(HttpResponseInfo),
    HttpContent(Chunk),
    HttpReadDone { err: u16 },
    DnsResolved(Option<Ipv4Addr>),
    PingReply { result: u16, time_ms: u32 },
    StationConnected([u8; 6]),
    StationDisconnected([u8; 6]),
    LinkConnected,
    GotIp,
    LinkDisconnected,
    ErrorCode(u16),
    OutOfMemory { parser: bool },
}

/// Events forwarded to the registered upper layer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverEvent {
    Connect([u8; 6]),
    Disconnect([u8; 6]),
    Ready,
}

pub type EventCallback = fn(DriverEvent);

/// Transport side handle into the dispatcher.
///
/// Payload that follows a `+QIURC: "recv"` header or a `CONNECT` of
/// `+QHTTPREAD` never reaches the line parser, the transport pushes it here
/// in order, header first.
#[derive(Clone, Copy)]
pub struct Notifier<'d> {
    ch: state::Runner<'d>,
    events: &'d EventChannel,
}

impl<'d> Notifier<'d> {
    pub(crate) fn new(ch: state::Runner<'d>, events: &'d EventChannel) -> Self {
        Self { ch, events }
    }

    /// Queue `event` without waiting. Returns `false` if the queue is full
    /// and the event was dropped.
    pub fn try_notify(&self, event: Event) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.ch.with(|s| {
                    s.dropped_events = s.dropped_events.wrapping_add(1);
                    s.dropped_events
                });
                warn!("Event queue full, dropped {} events so far", dropped);
                false
            }
        }
    }

    /// Events refused by [`Self::try_notify`] since the driver was created.
    pub fn dropped_events(&self) -> u32 {
        self.ch.with(|s| s.dropped_events)
    }

    pub async fn notify(&self, event: Event) {
        self.events.send(event).await
    }

    pub async fn rx_header(&self, conn_id: u8, len: u16) {
        self.notify(Event::RxHeader { conn_id, len }).await
    }

    pub async fn rx_data(&self, data: &[u8]) {
        for chunk in data.chunks(EVENT_CHUNK_SIZE) {
            if let Ok(chunk) = Chunk::from_slice(chunk) {
                self.notify(Event::RxData(chunk)).await;
            }
        }
    }

    pub async fn http_content(&self, data: &[u8]) {
        for chunk in data.chunks(EVENT_CHUNK_SIZE) {
            if let Ok(chunk) = Chunk::from_slice(chunk) {
                self.notify(Event::HttpContent(chunk)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_counts_dropped_events() {
        let mut shared = state::State::new();
        let ch = state::Runner::new(&mut shared);
        let events = EventChannel::new();
        let notifier = Notifier::new(ch, &events);

        for _ in 0..EVENT_CHANNEL_CAPACITY {
            assert!(notifier.try_notify(Event::Execute));
        }
        assert_eq!(notifier.dropped_events(), 0);

        assert!(!notifier.try_notify(Event::Ready));
        assert!(!notifier.try_notify(Event::GotIp));
        assert_eq!(notifier.dropped_events(), 2);
        assert_eq!(ch.with(|s| s.dropped_events), 2);

        assert!(events.try_receive().is_ok());
        assert!(notifier.try_notify(Event::Execute));
        assert_eq!(notifier.dropped_events(), 2);
    }
}
