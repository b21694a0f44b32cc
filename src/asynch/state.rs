//! Driver registry and the notification dispatcher.
//!
//! Everything the module tells us ends up in [`Shared::dispatch`], which
//! updates the socket tables and raises event flags for whoever waits on
//! them. The dispatcher never waits and never talks to the module.

use core::cell::RefCell;
use core::cmp;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{with_timeout, Duration, TimeoutError};
use no_std_net::Ipv4Addr;

use super::event::{DriverEvent, Event, EventCallback, HttpResponseInfo, LinkInfo};
use crate::config::CONTEXT_ID_DEFAULT;
use crate::flags::{self, EventFlags};
use crate::options::OptionsCache;
use crate::socket::{
    ConnId, ConnIdAllocator, PdpHandle, PdpSocketSet, SocketHandle, SocketSet, SocketState,
};

/// Runtime copy of the integrator's [`CellularConfig`](crate::config::CellularConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settings {
    pub conn_info_polling: bool,
    pub http_polling: bool,
    pub accept_timeout: Option<Duration>,
    pub context_id: u8,
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            conn_info_polling: false,
            http_polling: false,
            accept_timeout: None,
            context_id: CONTEXT_ID_DEFAULT,
        }
    }
}

pub struct State {
    shared: Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared::new())),
        }
    }
}

/// Packet currently streaming in on the data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RxTarget {
    /// `None` when the packet is flushed
    socket: Option<SocketHandle>,
    remaining: u16,
}

/// What the caller of [`Shared::dispatch`] still has to do once the
/// registry lock is released.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dispatched {
    /// Forward to the registered callback
    pub notify: Option<DriverEvent>,
    /// HTTP content that did not fit, retry from this offset once the
    /// consumer drained a half
    pub backpressure: Option<(PdpHandle, usize)>,
}

pub struct Shared {
    pub(crate) sockets: SocketSet,
    pub(crate) pdp: PdpSocketSet,
    pub(crate) conn_ids: ConnIdAllocator,
    pub(crate) flags: EventFlags,
    pub(crate) settings: Settings,
    pub(crate) initialized: bool,
    pub(crate) powered: bool,
    pub(crate) station_connected: bool,
    pub(crate) got_ip: bool,
    pub(crate) options: OptionsCache,
    pub(crate) callback: Option<EventCallback>,
    rx: Option<RxTarget>,
    pub(crate) dropped_packets: u32,
    /// Transport events refused by a full event queue
    pub(crate) dropped_events: u32,
    pub(crate) last_error: Option<u16>,
    /// First DNS result since the lookup started
    pub(crate) dns: Option<Option<Ipv4Addr>>,
    /// First ping result since the request, `(result, time_ms)`
    pub(crate) ping: Option<(u16, u32)>,
    pub(crate) http: Option<HttpResponseInfo>,
    pub(crate) http_read_err: Option<u16>,
}

impl Shared {
    const fn new() -> Self {
        Self {
            sockets: SocketSet::new(),
            pdp: PdpSocketSet::new(),
            conn_ids: ConnIdAllocator::new(),
            flags: EventFlags::new(),
            settings: Settings::new(),
            initialized: false,
            powered: false,
            station_connected: false,
            got_ip: false,
            options: OptionsCache::new(),
            callback: None,
            rx: None,
            dropped_packets: 0,
            dropped_events: 0,
            last_error: None,
            dns: None,
            ping: None,
            http: None,
            http_read_err: None,
        }
    }

    /// Drop every socket, PDP socket and connection id.
    pub(crate) fn reset_registries(&mut self) {
        self.sockets.reset();
        self.pdp.reset();
        self.conn_ids.reset();
        self.rx = None;
    }

    /// Release `handle` without the module's help. Its connection id is
    /// freed, a backlog slot goes back to `Listen`, anything else to `Free`.
    pub(crate) fn release(&mut self, handle: SocketHandle) {
        if let Some(rx) = self.rx.as_mut().filter(|rx| rx.socket == Some(handle)) {
            rx.socket = None;
        }
        let Ok(socket) = self.sockets.get_mut(handle) else {
            return;
        };
        if let Some(id) = socket.conn_id.take() {
            self.conn_ids.free(id);
        }
        if socket.server.is_some() {
            socket.recycle();
        } else {
            socket.reset();
        }
        debug!("[{}] released, now {:?}", handle.0, socket.state);
    }

    pub(crate) fn dispatch(&mut self, event: Event) -> Dispatched {
        let mut out = Dispatched::default();

        match event {
            Event::Execute => trace!("Transport activity"),
            Event::Ready => {
                info!("Module ready");
                self.flags.set(flags::READY);
                out.notify = Some(DriverEvent::Ready);
            }
            Event::ConnectionOpened(info) if info.server => self.incoming(info),
            Event::ConnectionOpened(info) => self.connection_opened(info),
            Event::ControlConnectionOpened { conn_id } => self.control_connection_opened(conn_id),
            Event::ConnectionFailed { conn_id, err } => self.connection_failed(conn_id, err),
            Event::ConnectionClosed { conn_id } => self.connection_closed(conn_id),
            Event::RxHeader { conn_id, len } => self.rx_header(conn_id, len),
            Event::RxData(chunk) => self.rx_data(&chunk),
            Event::HttpResponse(info) => {
                debug!("HTTP response, err {} status {:?}", info.err, info.status);
                self.http = Some(info);
                self.flags.set(flags::HTTP_RESPONSE);
            }
            Event::HttpContent(chunk) => {
                out.backpressure = self
                    .pdp
                    .connected()
                    .and_then(|handle| {
                        let taken = self.feed_http(handle, &chunk);
                        (taken < chunk.len()).then_some((handle, taken))
                    });
            }
            Event::HttpReadDone { err } => self.http_read_done(err),
            Event::DnsResolved(ip) => {
                if self.dns.is_none() {
                    self.dns = Some(ip);
                }
                self.flags.set(flags::DNS);
            }
            Event::PingReply { result, time_ms } => {
                if self.ping.is_none() {
                    self.ping = Some((result, time_ms));
                }
                self.flags.set(flags::PING);
            }
            Event::StationConnected(mac) => out.notify = Some(DriverEvent::Connect(mac)),
            Event::StationDisconnected(mac) => out.notify = Some(DriverEvent::Disconnect(mac)),
            Event::LinkConnected => self.station_connected = true,
            Event::GotIp => self.got_ip = true,
            Event::LinkDisconnected => {
                warn!("Data link lost");
                self.station_connected = false;
                self.got_ip = false;
            }
            Event::ErrorCode(code) => {
                debug!("Module error {}", code);
                self.last_error = Some(code);
            }
            Event::OutOfMemory { parser: false } => {
                self.dropped_packets = self.dropped_packets.wrapping_add(1);
                warn!("Socket buffer exhausted, packet dropped");
            }
            Event::OutOfMemory { parser: true } => {
                error!("Response parser out of memory");
                self.powered = false;
            }
        }

        out
    }

    fn connection_opened(&mut self, info: LinkInfo) {
        let Some(conn_id) = ConnId::new(info.conn_id) else {
            warn!("Open notification for invalid connection {}", info.conn_id);
            return;
        };
        let Some(handle) = self.connecting(conn_id) else {
            warn!("No socket waiting for connection {}", info.conn_id);
            return;
        };
        if let Ok(socket) = self.sockets.get_mut(handle) {
            socket.state = SocketState::Connected;
            if info.local_port != 0 {
                socket.local_port = info.local_port;
            }
            if let Some((ip, port)) = info.remote {
                socket.remote_ip = ip;
                socket.remote_port = port;
            }
        }
        debug!("[{}] connected as {}", handle.0, info.conn_id);
        self.flags.set(flags::conn_open(handle.0));
    }

    fn incoming(&mut self, info: LinkInfo) {
        let Some(conn_id) = ConnId::new(info.conn_id) else {
            warn!("Incoming connection with invalid id {}", info.conn_id);
            return;
        };
        let Some(slot) = self.assign_backlog(conn_id, info.server_id, info.remote) else {
            warn!("No backlog slot for connection {}", info.conn_id);
            return;
        };
        self.conn_ids.accept(conn_id);
        debug!("[{}] incoming connection {}", slot.0, info.conn_id);
        if !self.settings.http_polling {
            self.flags.set(flags::CONN_ACCEPT);
        }
    }

    fn control_connection_opened(&mut self, raw: u8) {
        let Some(conn_id) = ConnId::new(raw) else {
            return;
        };
        if self.connecting(conn_id).is_some() {
            self.connection_opened(LinkInfo {
                conn_id: raw,
                server: false,
                server_id: None,
                local_port: 0,
                remote: None,
            });
        } else {
            self.incoming(LinkInfo {
                conn_id: raw,
                server: true,
                server_id: None,
                local_port: 0,
                remote: None,
            });
        }
    }

    /// Socket in `ConnectReq` waiting for `conn_id`.
    fn connecting(&self, conn_id: ConnId) -> Option<SocketHandle> {
        self.sockets
            .iter()
            .find(|(_, s)| s.state == SocketState::ConnectReq && s.conn_id == Some(conn_id))
            .map(|(h, _)| h)
    }

    /// Hand a new connection to the first `Listen` slot of the accepting
    /// server. Without a matching server id the first server is used.
    fn assign_backlog(
        &mut self,
        conn_id: ConnId,
        server_id: Option<u8>,
        remote: Option<(Ipv4Addr, u16)>,
    ) -> Option<SocketHandle> {
        let is_server = |set: &SocketSet, h: SocketHandle| {
            set.get(h)
                .map_or(false, |s| s.state == SocketState::Server)
        };

        let server = server_id
            .and_then(ConnId::new)
            .and_then(|id| self.sockets.find_by_conn_id(id))
            .filter(|&h| is_server(&self.sockets, h))
            .or_else(|| {
                self.sockets
                    .iter()
                    .find(|(_, s)| s.state == SocketState::Server)
                    .map(|(h, _)| h)
            })?;

        let slot = self.sockets.backlog_ring(server).find(|&h| {
            self.sockets
                .get(h)
                .map_or(false, |s| s.state == SocketState::Listen)
        })?;

        let socket = self.sockets.get_mut(slot).ok()?;
        socket.state = SocketState::Connected;
        socket.conn_id = Some(conn_id);
        socket.accepted = false;
        socket.rx_len = 0;
        socket.rx.clear();
        if let Some((ip, port)) = remote {
            socket.remote_ip = ip;
            socket.remote_port = port;
        }
        Some(slot)
    }

    fn connection_failed(&mut self, raw: u8, err: u16) {
        let Some(conn_id) = ConnId::new(raw) else {
            return;
        };
        let Some(handle) = self.connecting(conn_id) else {
            warn!("Open of unknown connection {} failed: {}", raw, err);
            return;
        };
        self.conn_ids.free(conn_id);
        if let Ok(socket) = self.sockets.get_mut(handle) {
            socket.state = SocketState::Closed;
            socket.conn_id = None;
        }
        debug!("[{}] open failed: {}", handle.0, err);
        self.last_error = Some(err);
        self.flags
            .set(flags::conn_open(handle.0) | flags::conn_close(handle.0));
    }

    fn connection_closed(&mut self, raw: u8) {
        let Some(conn_id) = ConnId::new(raw) else {
            return;
        };
        self.conn_ids.free(conn_id);
        let Some(handle) = self.sockets.find_by_conn_id(conn_id) else {
            debug!("Connection {} closed, no owner", raw);
            return;
        };
        if self.rx.and_then(|rx| rx.socket) == Some(handle) {
            self.rx = None;
        }

        let Ok(socket) = self.sockets.get_mut(handle) else {
            return;
        };
        match (socket.server, socket.state) {
            (None, SocketState::Closing) => socket.reset(),
            (Some(_), SocketState::Closing) => socket.recycle(),
            (Some(_), SocketState::Connected) if !socket.accepted => socket.recycle(),
            _ => {
                socket.state = SocketState::Closed;
                socket.conn_id = None;
            }
        }
        debug!("[{}] closed, now {:?}", handle.0, socket.state);
        self.flags.set(flags::conn_close(handle.0));
    }

    fn rx_header(&mut self, raw: u8, len: u16) {
        if let Some(stale) = self.rx.take() {
            warn!("Packet cut short, {} bytes missing", stale.remaining);
        }
        if len == 0 {
            return;
        }

        let owner = ConnId::new(raw).and_then(|id| self.sockets.find_by_conn_id(id));
        let accepted = owner.filter(|&h| {
            self.sockets
                .get_mut(h)
                .map_or(false, |s| s.push_frame_header(len))
        });
        match (owner, accepted) {
            (None, _) => warn!("Data for unknown connection {}, flushing {} bytes", raw, len),
            (Some(h), None) => {
                self.dropped_packets = self.dropped_packets.wrapping_add(1);
                warn!("[{}] receive queue full, flushing {} bytes", h.0, len);
            }
            _ => {}
        }

        self.rx = Some(RxTarget {
            socket: accepted,
            remaining: len,
        });
    }

    fn rx_data(&mut self, data: &[u8]) {
        let Some(target) = self.rx.as_mut() else {
            warn!("{} data bytes without a header", data.len());
            return;
        };
        let n = cmp::min(data.len(), target.remaining as usize);
        if n < data.len() {
            warn!("{} bytes past the packet end dropped", data.len() - n);
        }
        target.remaining -= n as u16;
        let done = target.remaining == 0;
        let socket = target.socket;
        if done {
            self.rx = None;
        }

        if let Some(handle) = socket {
            if let Ok(s) = self.sockets.get_mut(handle) {
                s.rx.enqueue_slice(&data[..n]);
            }
            if done {
                trace!("[{}] packet complete", handle.0);
                self.flags.set(flags::rx_done(handle.0));
            }
        }
    }

    /// Push response content into the handoff of `handle`. Returns how much
    /// was taken.
    pub(crate) fn feed_http(&mut self, handle: PdpHandle, data: &[u8]) -> usize {
        let Ok(pdp) = self.pdp.get_mut(handle) else {
            return data.len();
        };
        let (taken, signal) = pdp.handoff.produce(data);
        if signal != 0 {
            pdp.events.set(signal);
        }
        taken
    }

    fn http_read_done(&mut self, err: u16) {
        self.http_read_err = Some(err);
        if let Some(pdp) = self
            .pdp
            .connected()
            .and_then(|handle| self.pdp.get_mut(handle).ok())
        {
            if err != 0 {
                warn!("HTTP read failed: {}", err);
                pdp.handoff.fail();
                pdp.events.set(flags::HANDOFF_FAIL);
            } else if !pdp.handoff.is_bounded() {
                let signal = pdp.handoff.finish();
                if signal != 0 {
                    pdp.events.set(signal);
                }
            }
        }
        self.flags.set(flags::HTTP_READ);
    }

    /// Abandon every running response transfer.
    pub(crate) fn fail_transfers(&mut self) {
        for pdp in self.pdp.iter_mut() {
            if pdp.handoff.is_active() {
                pdp.handoff.fail();
                pdp.events.set(flags::HANDOFF_FAIL);
            }
        }
    }
}

/// Handle onto the shared registry.
#[derive(Clone, Copy)]
pub struct Runner<'d> {
    pub(crate) shared: &'d Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl<'d> Runner<'d> {
    pub fn new(state: &'d mut State) -> Self {
        Self {
            shared: &state.shared,
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            f(s)
        })
    }

    pub(crate) fn dispatch(&self, event: Event) -> Dispatched {
        self.with(|s| s.dispatch(event))
    }

    /// Wait for any of `mask` on the driver flags and consume what matched.
    /// `None` waits forever.
    pub(crate) async fn wait_flags(
        &self,
        mask: u32,
        timeout: Option<Duration>,
    ) -> Result<u32, TimeoutError> {
        let fut = poll_fn(|cx| self.with(|s| s.flags.poll_take(mask, cx)));
        match timeout {
            Some(timeout) => with_timeout(timeout, fut).await,
            None => Ok(fut.await),
        }
    }

    /// Like [`Self::wait_flags`], on the handoff flags of a PDP socket. An
    /// invalid handle reads as a failed handoff.
    pub(crate) async fn wait_pdp_flags(
        &self,
        handle: PdpHandle,
        mask: u32,
        timeout: Option<Duration>,
    ) -> Result<u32, TimeoutError> {
        let fut = poll_fn(|cx| {
            self.with(|s| match s.pdp.get_mut(handle) {
                Ok(pdp) => pdp.events.poll_take(mask, cx),
                Err(_) => Poll::Ready(flags::HANDOFF_FAIL),
            })
        });
        match timeout {
            Some(timeout) => with_timeout(timeout, fut).await,
            None => Ok(fut.await),
        }
    }

    /// Wait until the consumer drained a half of the handoff of `handle`,
    /// or gave up on the transfer.
    pub(crate) async fn wait_handoff_room(
        &self,
        handle: PdpHandle,
        timeout: Duration,
    ) -> Result<(), TimeoutError> {
        let fut = poll_fn(|cx| {
            self.with(|s| match s.pdp.get_mut(handle) {
                Ok(pdp) if pdp.handoff.is_active() => pdp
                    .events
                    .poll_take(flags::HANDOFF_CONSUMED, cx)
                    .map(|_| ()),
                _ => Poll::Ready(()),
            })
        });
        with_timeout(timeout, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asynch::event::Chunk;
    use crate::command::psn::types::ContextType;
    use crate::flags::*;
    use crate::socket::{AddressFamily, SocketType};
    use no_std_net::IpAddr;

    const PEER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 9);

    fn stream(s: &mut Shared) -> SocketHandle {
        s.sockets
            .create(AddressFamily::Inet, SocketType::Stream, None)
            .unwrap()
    }

    /// A socket in `ConnectReq` holding a fresh connection id.
    fn connecting(s: &mut Shared) -> (SocketHandle, ConnId) {
        let h = stream(s);
        let id = s.conn_ids.alloc().unwrap();
        let socket = s.sockets.get_mut(h).unwrap();
        socket.state = SocketState::ConnectReq;
        socket.conn_id = Some(id);
        (h, id)
    }

    fn opened(conn_id: u8) -> Event {
        Event::ConnectionOpened(LinkInfo {
            conn_id,
            server: false,
            server_id: None,
            local_port: 0,
            remote: None,
        })
    }

    fn incoming(conn_id: u8, server_id: u8) -> Event {
        Event::ConnectionOpened(LinkInfo {
            conn_id,
            server: true,
            server_id: Some(server_id),
            local_port: 0,
            remote: Some((PEER, 40000 + conn_id as u16)),
        })
    }

    /// A listening server on port 80 with `backlog` slots, holding
    /// connection id 0.
    fn server(s: &mut Shared, backlog: usize) -> SocketHandle {
        let (h, id) = connecting(s);
        s.sockets.get_mut(h).unwrap().state = SocketState::Created;
        s.sockets
            .bind(h, IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80)
            .unwrap();
        let socket = s.sockets.get_mut(h).unwrap();
        socket.state = SocketState::ConnectReq;
        socket.conn_id = Some(id);
        s.dispatch(opened(id.raw()));
        s.sockets.make_server(h, backlog).unwrap();
        s.flags.clear(u32::MAX);
        h
    }

    /// Connection ids held by live sockets, as an allocator bitmap.
    fn held_ids(s: &Shared) -> u8 {
        s.sockets
            .iter()
            .filter(|(_, socket)| socket.state() != SocketState::Free)
            .filter_map(|(_, socket)| socket.conn_id())
            .fold(0, |bits, id| bits | 1 << id.raw())
    }

    fn chunk(data: &[u8]) -> Chunk {
        Chunk::from_slice(data).unwrap()
    }

    #[test]
    fn client_open_and_failure() {
        let mut s = Shared::new();
        let (a, a_id) = connecting(&mut s);
        let (b, b_id) = connecting(&mut s);

        s.dispatch(Event::ConnectionOpened(LinkInfo {
            conn_id: a_id.raw(),
            server: false,
            server_id: None,
            local_port: 1234,
            remote: Some((PEER, 443)),
        }));
        let socket = s.sockets.get(a).unwrap();
        assert_eq!(socket.state(), SocketState::Connected);
        assert_eq!((socket.remote_ip, socket.remote_port), (PEER, 443));
        assert_eq!(socket.local_port, 1234);
        assert_eq!(s.flags.take(conn_open(a.0)), Some(conn_open(a.0)));

        s.dispatch(Event::ConnectionFailed {
            conn_id: b_id.raw(),
            err: 566,
        });
        let socket = s.sockets.get(b).unwrap();
        assert_eq!(socket.state(), SocketState::Closed);
        assert_eq!(socket.conn_id(), None);
        assert!(!s.conn_ids.is_allocated(b_id));
        assert!(s.conn_ids.is_allocated(a_id));
        assert_eq!(
            s.flags.take(conn_open(b.0) | conn_close(b.0)),
            Some(conn_open(b.0) | conn_close(b.0))
        );
        assert_eq!(s.last_error, Some(566));
    }

    #[test]
    fn incoming_connections_fill_the_backlog() {
        let mut s = Shared::new();
        let srv = server(&mut s, 2);

        s.dispatch(incoming(1, 0));
        s.dispatch(incoming(2, 0));
        assert_eq!(s.flags.take(CONN_ACCEPT), Some(CONN_ACCEPT));

        let slots: std::vec::Vec<_> = s.sockets.backlog_ring(srv).collect();
        assert_eq!(slots.len(), 2);
        for (slot, id) in slots.iter().zip([1u8, 2]) {
            let socket = s.sockets.get(*slot).unwrap();
            assert_eq!(socket.state(), SocketState::Connected);
            assert_eq!(socket.conn_id().map(ConnId::raw), Some(id));
            assert_eq!(socket.remote_port, 40000 + id as u16);
            assert_eq!(socket.local_port, 80);
            assert!(!socket.accepted);
            assert!(s.conn_ids.is_allocated(ConnId::new(id).unwrap()));
        }

        // Backlog exhausted: the connection is refused and its id stays free.
        s.dispatch(incoming(3, 0));
        assert_eq!(s.sockets.find_by_conn_id(ConnId::new(3).unwrap()), None);
        assert!(!s.conn_ids.is_allocated(ConnId::new(3).unwrap()));
        assert_eq!(s.flags.take(CONN_ACCEPT), None);
        assert_eq!(s.conn_ids.bits(), held_ids(&s));
    }

    #[test]
    fn refused_connections_keep_ids_consistent() {
        let mut s = Shared::new();
        server(&mut s, 1);
        s.dispatch(incoming(1, 0));
        assert_eq!(s.conn_ids.bits(), held_ids(&s));

        for id in 2..5 {
            s.dispatch(incoming(id, 0));
            assert_eq!(s.conn_ids.bits(), held_ids(&s));
        }
        assert_eq!(s.conn_ids.bits(), 0b00011);

        // No server at all.
        let mut s = Shared::new();
        s.dispatch(incoming(1, 0));
        assert_eq!(s.conn_ids.bits(), 0);
    }

    #[test]
    fn polled_open_prefers_waiting_client() {
        let mut s = Shared::new();
        let srv = server(&mut s, 1);
        let (client, id) = connecting(&mut s);

        s.dispatch(Event::ControlConnectionOpened { conn_id: id.raw() });
        assert_eq!(s.sockets.get(client).unwrap().state(), SocketState::Connected);

        s.dispatch(Event::ControlConnectionOpened { conn_id: 4 });
        let slot = s.sockets.get(srv).unwrap().backlog.unwrap();
        assert_eq!(s.sockets.get(slot).unwrap().conn_id().map(ConnId::raw), Some(4));
    }

    #[test]
    fn close_terminal_states() {
        let mut s = Shared::new();
        let srv = server(&mut s, 2);
        s.dispatch(incoming(1, 0));
        s.dispatch(incoming(2, 0));
        let mut ring = s.sockets.backlog_ring(srv);
        let (pending, taken) = (ring.next().unwrap(), ring.next().unwrap());
        s.sockets.get_mut(taken).unwrap().accepted = true;

        // Unaccepted slot goes back to listening, accepted one is closed.
        s.dispatch(Event::ConnectionClosed { conn_id: 1 });
        s.dispatch(Event::ConnectionClosed { conn_id: 2 });
        assert_eq!(s.sockets.get(pending).unwrap().state(), SocketState::Listen);
        assert_eq!(s.sockets.get(taken).unwrap().state(), SocketState::Closed);
        assert_eq!(
            s.flags.take(conn_close(pending.0) | conn_close(taken.0)),
            Some(conn_close(pending.0) | conn_close(taken.0))
        );

        // Locally closing client is released completely.
        let (client, id) = connecting(&mut s);
        s.dispatch(opened(id.raw()));
        s.sockets.get_mut(client).unwrap().state = SocketState::Closing;
        s.dispatch(Event::ConnectionClosed { conn_id: id.raw() });
        assert_eq!(s.sockets.get(client).unwrap().state(), SocketState::Free);

        assert_eq!(s.conn_ids.bits(), 0b0001, "only the listener id is left");
    }

    #[test]
    fn local_release_flushes_packet_in_flight() {
        let mut s = Shared::new();
        let (h, id) = connecting(&mut s);
        s.dispatch(opened(id.raw()));
        s.dispatch(Event::RxHeader {
            conn_id: id.raw(),
            len: 6,
        });
        s.dispatch(Event::RxData(chunk(b"abc")));

        s.release(h);
        assert_eq!(s.sockets.get(h).unwrap().state(), SocketState::Free);
        assert!(!s.conn_ids.is_allocated(id));

        // The slot is reused before the rest of the packet arrives.
        let again = stream(&mut s);
        assert_eq!(again, h);
        s.dispatch(Event::RxData(chunk(b"def")));
        assert!(s.sockets.get(h).unwrap().rx.is_empty());
    }

    #[test]
    fn received_packets_are_framed() {
        let mut s = Shared::new();
        let (h, id) = connecting(&mut s);
        s.dispatch(opened(id.raw()));

        s.dispatch(Event::RxHeader {
            conn_id: id.raw(),
            len: 8,
        });
        s.dispatch(Event::RxData(chunk(b"abcd")));
        assert_eq!(s.flags.take(rx_done(h.0)), None);
        s.dispatch(Event::RxData(chunk(b"efghXX")));
        assert_eq!(s.flags.take(rx_done(h.0)), Some(rx_done(h.0)));

        let socket = s.sockets.get_mut(h).unwrap();
        assert!(socket.load_frame_header());
        let mut buf = [0u8; 16];
        assert_eq!(socket.read_frame(&mut buf), (8, true));
        assert_eq!(&buf[..8], b"abcdefgh");
    }

    #[test]
    fn oversized_packet_is_flushed() {
        let mut s = Shared::new();
        let (h, id) = connecting(&mut s);
        s.dispatch(opened(id.raw()));

        s.dispatch(Event::RxHeader {
            conn_id: id.raw(),
            len: 4000,
        });
        for _ in 0..16 {
            s.dispatch(Event::RxData(chunk(&[0u8; 250])));
        }
        assert_eq!(s.dropped_packets, 1);
        assert!(s.sockets.get(h).unwrap().rx.is_empty());
        assert_eq!(s.flags.take(rx_done(h.0)), None);

        // The next packet is unaffected.
        s.dispatch(Event::RxHeader {
            conn_id: id.raw(),
            len: 2,
        });
        s.dispatch(Event::RxData(chunk(b"ok")));
        assert_eq!(s.flags.take(rx_done(h.0)), Some(rx_done(h.0)));
    }

    #[test]
    fn http_content_backpressure() {
        let mut s = Shared::new();
        let pdp = s
            .pdp
            .bind(1, ContextType::Ipv4, Ipv4Addr::new(10, 0, 0, 2))
            .unwrap();
        let socket = s.pdp.get_mut(pdp).unwrap();
        socket.state = crate::socket::PdpState::Connected;
        socket.handoff.begin(Some(1200));

        let data = [7u8; 256];
        let mut out = Dispatched::default();
        for _ in 0..5 {
            out = s.dispatch(Event::HttpContent(chunk(&data)));
        }
        // Two halves of 512 hold 1024 bytes, the fifth chunk fits nothing.
        assert_eq!(out.backpressure, Some((pdp, 0)));
        let events = &mut s.pdp.get_mut(pdp).unwrap().events;
        assert_eq!(events.take(HANDOFF_PARTIAL), Some(HANDOFF_PARTIAL));

        let mut buf = [0u8; 512];
        s.pdp.get_mut(pdp).unwrap().handoff.consume(&mut buf).unwrap();
        // 176 bytes complete the body, the rest of the chunk is dropped.
        assert_eq!(s.feed_http(pdp, &data), data.len());
        let events = &mut s.pdp.get_mut(pdp).unwrap().events;
        assert_eq!(events.take(HANDOFF_COMPLETE), Some(HANDOFF_COMPLETE));
    }

    #[test]
    fn http_read_finishes_undeclared_length() {
        let mut s = Shared::new();
        let pdp = s
            .pdp
            .bind(1, ContextType::Ipv4, Ipv4Addr::new(10, 0, 0, 2))
            .unwrap();
        let socket = s.pdp.get_mut(pdp).unwrap();
        socket.state = crate::socket::PdpState::Connected;
        socket.handoff.begin(None);

        assert_eq!(s.dispatch(Event::HttpContent(chunk(b"hello"))), Dispatched::default());
        s.dispatch(Event::HttpReadDone { err: 0 });
        assert_eq!(s.flags.take(HTTP_READ), Some(HTTP_READ));
        let socket = s.pdp.get_mut(pdp).unwrap();
        assert_eq!(socket.events.take(HANDOFF_COMPLETE), Some(HANDOFF_COMPLETE));
        let mut buf = [0u8; 8];
        let (n, info) = socket.handoff.consume(&mut buf).unwrap();
        assert_eq!((&buf[..n], info.last), (&b"hello"[..], true));
    }

    #[test]
    fn first_lookup_result_wins() {
        let mut s = Shared::new();
        s.dispatch(Event::DnsResolved(Some(PEER)));
        s.dispatch(Event::DnsResolved(Some(Ipv4Addr::new(1, 1, 1, 1))));
        assert_eq!(s.dns, Some(Some(PEER)));
        assert_eq!(s.flags.take(DNS), Some(DNS));

        s.dispatch(Event::PingReply {
            result: 0,
            time_ms: 42,
        });
        s.dispatch(Event::PingReply {
            result: 569,
            time_ms: 0,
        });
        assert_eq!(s.ping, Some((0, 42)));
    }

    #[test]
    fn forwarded_and_status_events() {
        let mut s = Shared::new();
        let mac = [1, 2, 3, 4, 5, 6];
        assert_eq!(
            s.dispatch(Event::StationConnected(mac)).notify,
            Some(DriverEvent::Connect(mac))
        );
        assert_eq!(s.dispatch(Event::Ready).notify, Some(DriverEvent::Ready));
        assert_eq!(s.flags.take(READY), Some(READY));

        s.powered = true;
        s.dispatch(Event::LinkConnected);
        s.dispatch(Event::GotIp);
        assert!(s.station_connected && s.got_ip);
        s.dispatch(Event::LinkDisconnected);
        assert!(!s.station_connected && !s.got_ip);

        s.dispatch(Event::ErrorCode(550));
        s.dispatch(Event::OutOfMemory { parser: false });
        assert_eq!((s.last_error, s.dropped_packets), (Some(550), 1));
        s.dispatch(Event::OutOfMemory { parser: true });
        assert!(!s.powered);
    }
}
