//! BSD style socket calls on top of the module's TCP/IP stack.
//!
//! Registry transitions happen under the registry lock, commands under the
//! command channel lock, and nothing waits on a flag while holding either.

use atat::asynch::AtatClient;
use embassy_time::Duration;
use heapless::Vec;
use no_std_net::{IpAddr, Ipv4Addr, SocketAddr};

use super::{ip_str, state, write_payload, AtHandle};
use crate::command::ip_transport_layer::types::{AccessMode, ServiceType};
use crate::command::ip_transport_layer::{
    CloseSocket, GetSocketState, OpenSocket, PrepareSend, ResolveHostname,
};
use crate::command::EGRESS_CHUNK_SIZE;
use crate::flags::{self, conn_close, conn_open, rx_done};
use crate::module_timing::{close_grace_time, connect_time, dns_time};
use crate::socket::{
    timeout_from_ms, AddressFamily, ConnId, Protocol, SocketError, SocketHandle, SocketOption,
    SocketOptionId, SocketState, SocketType, MAX_DATAGRAM, SOCKET_NUM,
};

type Result<T> = core::result::Result<T, SocketError>;

/// Remote given for listeners and UDP services, which have none.
const NO_REMOTE: &str = "127.0.0.1";
/// Longest host name `+QIDNSGIP` takes.
const HOSTNAME_MAX: usize = 128;
/// Rescan interval of a blocking accept when incoming connections do not
/// raise the accept flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

enum Transfer {
    Stream(ConnId),
    Datagram {
        open: bool,
        fallback: SocketState,
        remote: (Ipv4Addr, u16),
    },
}

enum Closing {
    Released,
    Server(Option<ConnId>),
    Connection(ConnId),
}

enum Progress {
    Done,
    Wait(Option<Duration>),
}

pub struct Sockets<'d, AT: AtatClient> {
    ch: state::Runner<'d>,
    at: AtHandle<'d, AT>,
}

impl<'d, AT: AtatClient> Sockets<'d, AT> {
    pub(crate) fn new(ch: state::Runner<'d>, at: AtHandle<'d, AT>) -> Self {
        Self { ch, at }
    }

    pub fn create(
        &self,
        family: AddressFamily,
        kind: SocketType,
        protocol: Option<Protocol>,
    ) -> Result<SocketHandle> {
        self.ch.with(|s| s.sockets.create(family, kind, protocol))
    }

    pub fn bind(&self, handle: SocketHandle, ip: IpAddr, port: u16) -> Result<()> {
        self.ch.with(|s| s.sockets.bind(handle, ip, port))
    }

    /// Start a TCP listener on the bound port and put `backlog` sockets
    /// aside for incoming connections.
    pub async fn listen(&self, handle: SocketHandle, backlog: usize) -> Result<()> {
        self.ch.with(|s| s.sockets.check_listen(handle, backlog))?;
        self.open(
            handle,
            ServiceType::TcpListener,
            NO_REMOTE,
            0,
            SocketState::Bound,
            true,
        )
        .await?;

        let made = self.ch.with(|s| s.sockets.make_server(handle, backlog));
        if let Err(e) = made {
            warn!("[{}] backlog slots taken meanwhile", handle.0);
            let listener = self.ch.with(|s| s.sockets.get(handle).ok().and_then(|x| x.conn_id));
            if let Some(id) = listener {
                self.close_connection(id).await.ok();
            }
            self.ch.with(|s| {
                if let Ok(socket) = s.sockets.get_mut(handle) {
                    if let Some(id) = socket.conn_id.take() {
                        s.conn_ids.free(id);
                    }
                    socket.state = SocketState::Bound;
                }
            });
            return Err(e);
        }
        Ok(())
    }

    /// Take the next incoming connection of a listening socket.
    pub async fn accept(&self, handle: SocketHandle) -> Result<(SocketHandle, Ipv4Addr, u16)> {
        loop {
            let (pending, non_blocking, settings) = self.ch.with(|s| -> Result<_> {
                let pending = s.sockets.find_pending(handle)?;
                if let Some(slot) = pending {
                    s.sockets.get_mut(slot)?.accepted = true;
                }
                Ok((pending, s.sockets.get(handle)?.non_blocking, s.settings))
            })?;

            if let Some(slot) = pending {
                if settings.conn_info_polling {
                    self.poll_link_info(slot).await;
                }
                let remote = self
                    .ch
                    .with(|s| s.sockets.get(slot).map(|x| (x.remote_ip, x.remote_port)))?;
                debug!("[{}] accepted on [{}]", slot.0, handle.0);
                return Ok((slot, remote.0, remote.1));
            }

            if non_blocking {
                return Err(SocketError::WouldBlock);
            }
            if settings.http_polling {
                let interval = settings.accept_timeout.unwrap_or(ACCEPT_POLL_INTERVAL);
                self.ch.wait_flags(flags::CONN_ACCEPT, Some(interval)).await.ok();
            } else {
                self.ch
                    .wait_flags(flags::CONN_ACCEPT, settings.accept_timeout)
                    .await?;
            }
        }
    }

    pub async fn connect(&self, handle: SocketHandle, remote: SocketAddr) -> Result<()> {
        if remote.port() == 0 {
            return Err(SocketError::InvalidArgument);
        }
        let IpAddr::V4(ip) = remote.ip() else {
            return Err(SocketError::NotSupported);
        };
        let port = remote.port();

        let blocking = self.ch.with(|s| -> Result<Option<bool>> {
            let socket = s.sockets.get_mut(handle)?;
            match socket.state {
                SocketState::Free => return Err(SocketError::InvalidSocket),
                SocketState::Listen | SocketState::Server => {
                    return Err(SocketError::InvalidArgument)
                }
                SocketState::ConnectReq => return Err(SocketError::Already),
                SocketState::Connected => return Err(SocketError::IsConnected),
                SocketState::Closed => return Err(SocketError::TimedOut),
                SocketState::Closing => return Err(SocketError::Unspecified),
                SocketState::Created | SocketState::Bound => {}
            }

            if socket.kind == SocketType::Datagram {
                // Opened lazily by the first send or receive.
                socket.remote_ip = ip;
                socket.remote_port = port;
                socket.state = SocketState::Bound;
                return Ok(None);
            }
            if ip.is_unspecified() {
                return Err(SocketError::InvalidArgument);
            }
            socket.remote_ip = ip;
            socket.remote_port = port;
            Ok(Some(!socket.non_blocking))
        })?;

        match blocking {
            Some(blocking) => {
                let remote = ip_str(ip);
                self.open(
                    handle,
                    ServiceType::Tcp,
                    &remote,
                    port,
                    SocketState::Closed,
                    blocking,
                )
                .await
            }
            None => Ok(()),
        }
    }

    pub async fn recv(&self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize> {
        self.recv_from(handle, buf).await.map(|(n, _, _)| n)
    }

    /// Receive into `buf`. Datagrams are read whole, what does not fit is
    /// dropped. Stream reads return what is queued, up to `buf.len()`.
    pub async fn recv_from(
        &self,
        handle: SocketHandle,
        buf: &mut [u8],
    ) -> Result<(usize, Ipv4Addr, u16)> {
        let open_datagram = self.ch.with(|s| -> Result<bool> {
            let socket = s.sockets.get_open(handle)?;
            match (socket.state, socket.kind) {
                (SocketState::Connected, _) => Ok(false),
                (SocketState::Bound, SocketType::Datagram) => Ok(true),
                (SocketState::Closed | SocketState::Listen, _) if !socket.rx.is_empty() => {
                    Ok(false)
                }
                (SocketState::Closed, _) => Err(SocketError::ConnectionReset),
                (SocketState::Closing, _) => Err(SocketError::InvalidArgument),
                _ => Err(SocketError::NotConnected),
            }
        })?;
        if open_datagram {
            self.open_datagram(handle, SocketState::Bound).await?;
        }

        loop {
            let mut read = 0;
            let progress = self.ch.with(|s| -> Result<Progress> {
                let socket = s.sockets.get_open_mut(handle)?;
                while socket.load_frame_header() {
                    if buf.is_empty() {
                        return Ok(Progress::Done);
                    }
                    let (n, finished) = socket.read_frame(&mut buf[read..]);
                    read += n;
                    match socket.kind {
                        SocketType::Datagram if finished => return Ok(Progress::Done),
                        SocketType::Datagram => break,
                        SocketType::Stream if read == buf.len() => return Ok(Progress::Done),
                        SocketType::Stream if n == 0 => break,
                        SocketType::Stream => {}
                    }
                }

                if read > 0 {
                    Ok(Progress::Done)
                } else if socket.state != SocketState::Connected {
                    Err(SocketError::ConnectionReset)
                } else if socket.non_blocking {
                    Err(SocketError::WouldBlock)
                } else {
                    Ok(Progress::Wait(timeout_from_ms(socket.rx_timeout)))
                }
            })?;

            match progress {
                Progress::Done => {
                    let (ip, port) = self
                        .ch
                        .with(|s| s.sockets.get(handle).map(|x| (x.remote_ip, x.remote_port)))?;
                    return Ok((read, ip, port));
                }
                Progress::Wait(timeout) => {
                    self.ch
                        .wait_flags(rx_done(handle.0) | conn_close(handle.0), timeout)
                        .await?;
                }
            }
        }
    }

    pub async fn send(&self, handle: SocketHandle, data: &[u8]) -> Result<usize> {
        self.send_to(handle, data, None).await
    }

    /// Send `data`. Stream sockets ignore `remote`. Datagram sockets send to
    /// `remote`, or to the address given to `connect`, in one piece.
    pub async fn send_to(
        &self,
        handle: SocketHandle,
        data: &[u8],
        remote: Option<SocketAddr>,
    ) -> Result<usize> {
        let remote = match remote {
            Some(SocketAddr::V6(_)) => return Err(SocketError::NotSupported),
            Some(SocketAddr::V4(addr)) => Some((*addr.ip(), addr.port())),
            None => None,
        };

        let transfer = self.ch.with(|s| -> Result<Transfer> {
            let socket = s.sockets.get_open(handle)?;
            if socket.kind == SocketType::Stream {
                return match (socket.state, socket.conn_id) {
                    (SocketState::Connected, Some(id)) => Ok(Transfer::Stream(id)),
                    (SocketState::Closed, _) => Err(SocketError::ConnectionReset),
                    _ => Err(SocketError::NotConnected),
                };
            }

            if data.len() >= MAX_DATAGRAM {
                return Err(SocketError::NoMemory);
            }
            let remote = match remote {
                Some((ip, port)) if ip.is_unspecified() || port == 0 => {
                    return Err(SocketError::InvalidArgument)
                }
                Some(remote) => remote,
                None => s.sockets.remote(handle).ok_or(SocketError::NotConnected)?,
            };
            let open = match socket.state {
                SocketState::Connected => false,
                SocketState::Created | SocketState::Bound => true,
                _ => return Err(SocketError::NotConnected),
            };
            Ok(Transfer::Datagram {
                open,
                fallback: socket.state,
                remote,
            })
        })?;

        if data.is_empty() {
            return Ok(0);
        }

        match transfer {
            Transfer::Stream(id) => self.send_stream(handle, id, data).await,
            Transfer::Datagram {
                open,
                fallback,
                remote,
            } => {
                if open {
                    self.open_datagram(handle, fallback).await?;
                }
                self.send_datagram(handle, data, remote).await
            }
        }
    }

    async fn send_stream(&self, handle: SocketHandle, id: ConnId, data: &[u8]) -> Result<usize> {
        let mut sent = 0;
        for chunk in data.chunks(EGRESS_CHUNK_SIZE) {
            let result = async {
                let mut at = self.at.lock().await;
                at.send(&PrepareSend {
                    connect_id: id.raw(),
                    length: chunk.len(),
                    remote_ip: None,
                    remote_port: None,
                })
                .await?;
                write_payload(&mut *at, chunk).await
            }
            .await;

            match result {
                Ok(()) => sent += chunk.len(),
                Err(e) if sent == 0 => return Err(e.into()),
                Err(_) => {
                    warn!("[{}] send stopped after {} bytes", handle.0, sent);
                    break;
                }
            }

            let connected = self.ch.with(|s| {
                s.sockets
                    .get(handle)
                    .map_or(false, |x| x.state == SocketState::Connected && x.conn_id == Some(id))
            });
            if !connected {
                break;
            }
        }
        trace!("[{}] sent {} bytes", handle.0, sent);
        Ok(sent)
    }

    async fn send_datagram(
        &self,
        handle: SocketHandle,
        data: &[u8],
        (ip, port): (Ipv4Addr, u16),
    ) -> Result<usize> {
        let id = self
            .ch
            .with(|s| s.sockets.get(handle).ok().and_then(|x| x.conn_id))
            .ok_or(SocketError::NotConnected)?;
        let ip = ip_str(ip);

        let mut at = self.at.lock().await;
        at.send(&PrepareSend {
            connect_id: id.raw(),
            length: data.len(),
            remote_ip: Some(&ip),
            remote_port: Some(port),
        })
        .await?;
        write_payload(&mut *at, data).await?;
        trace!("[{}] sent {} byte datagram", handle.0, data.len());
        Ok(data.len())
    }

    /// Local address. Opens a datagram socket that is not open yet, so the
    /// module assigned port is known.
    pub async fn sock_name(&self, handle: SocketHandle) -> Result<(Ipv4Addr, u16)> {
        let (state, kind, polling) = self.ch.with(|s| {
            s.sockets
                .get_open(handle)
                .map(|x| (x.state, x.kind, s.settings.conn_info_polling))
        })?;
        if state < SocketState::Bound {
            return Err(SocketError::InvalidArgument);
        }
        if kind == SocketType::Datagram && state == SocketState::Bound {
            self.open_datagram(handle, SocketState::Bound).await?;
        }
        let state = self.ch.with(|s| s.sockets.get(handle).map(|x| x.state))?;
        if polling && state == SocketState::Connected {
            self.poll_link_info(handle).await;
        }
        self.ch
            .with(|s| s.sockets.get(handle).map(|x| (x.local_ip, x.local_port)))
    }

    pub fn peer_name(&self, handle: SocketHandle) -> Result<(Ipv4Addr, u16)> {
        self.ch.with(|s| {
            let socket = s.sockets.get_open(handle)?;
            let connected = match socket.kind {
                SocketType::Stream => socket.state == SocketState::Connected,
                SocketType::Datagram => matches!(
                    socket.state,
                    SocketState::Bound | SocketState::Connected
                ),
            };
            if !connected {
                return Err(SocketError::NotConnected);
            }
            s.sockets.remote(handle).ok_or(SocketError::NotConnected)
        })
    }

    pub fn get_opt(&self, handle: SocketHandle, id: SocketOptionId) -> Result<u32> {
        self.ch.with(|s| s.sockets.get_opt(handle, id))
    }

    pub fn set_opt(&self, handle: SocketHandle, option: SocketOption) -> Result<()> {
        self.ch.with(|s| s.sockets.set_opt(handle, option))
    }

    pub async fn close(&self, handle: SocketHandle) -> Result<()> {
        self.ch.with(|s| s.sockets.get_open(handle).map(|_| ()))?;
        // A close notification may already be on its way.
        self.ch
            .wait_flags(conn_close(handle.0), Some(close_grace_time()))
            .await
            .ok();

        let closing = self.ch.with(|s| -> Result<Closing> {
            let socket = s.sockets.get_mut(handle)?;
            match (socket.state, socket.conn_id) {
                (SocketState::Free | SocketState::Listen, _) => Err(SocketError::InvalidSocket),
                (SocketState::Server, id) => Ok(Closing::Server(id)),
                (SocketState::Connected | SocketState::Closing, Some(id)) => {
                    socket.state = SocketState::Closing;
                    Ok(Closing::Connection(id))
                }
                _ => {
                    s.release(handle);
                    Ok(Closing::Released)
                }
            }
        })?;

        match closing {
            Closing::Released => Ok(()),
            Closing::Connection(id) => {
                if let Err(e) = self.close_connection(id).await {
                    warn!("[{}] close failed", handle.0);
                    return Err(e);
                }
                self.ch.with(|s| {
                    let still_closing = s
                        .sockets
                        .get(handle)
                        .map_or(false, |x| {
                            x.state == SocketState::Closing && x.conn_id == Some(id)
                        });
                    if still_closing {
                        s.release(handle);
                    }
                });
                Ok(())
            }
            Closing::Server(listener) => {
                let children = self.ch.with(|s| {
                    let mut children: Vec<ConnId, SOCKET_NUM> = Vec::new();
                    for (_, socket) in s.sockets.iter() {
                        if socket.server == Some(handle) {
                            if let Some(id) = socket.conn_id {
                                children.push(id).ok();
                            }
                        }
                    }
                    children
                });
                for id in children.iter() {
                    self.close_connection(*id).await.ok();
                }
                if let Some(id) = listener {
                    self.close_connection(id).await?;
                }
                self.ch.with(|s| {
                    for id in children.iter() {
                        s.conn_ids.free(*id);
                    }
                    if let Some(id) = listener {
                        s.conn_ids.free(id);
                    }
                    s.sockets.release_backlog(handle);
                    if let Ok(socket) = s.sockets.get_mut(handle) {
                        socket.reset();
                    }
                });
                debug!("[{}] listener closed", handle.0);
                Ok(())
            }
        }
    }

    pub async fn get_host_by_name(&self, name: &str, family: AddressFamily) -> Result<Ipv4Addr> {
        if name.is_empty() || name.len() > HOSTNAME_MAX {
            return Err(SocketError::InvalidArgument);
        }
        if family != AddressFamily::Inet {
            return Err(SocketError::NotSupported);
        }

        // One lookup at a time, results are not tagged with the request.
        let mut at = self.at.lock().await;
        let context_id = self.ch.with(|s| {
            s.dns = None;
            s.flags.clear(flags::DNS);
            s.settings.context_id
        });
        at.send(&ResolveHostname {
            context_id,
            hostname: name,
        })
        .await?;

        let result = self.ch.wait_flags(flags::DNS, Some(dns_time())).await;
        drop(at);
        match result {
            Ok(_) => self
                .ch
                .with(|s| s.dns.take().flatten())
                .ok_or(SocketError::HostNotFound),
            Err(_) => Err(SocketError::TimedOut),
        }
    }

    async fn open_datagram(&self, handle: SocketHandle, fallback: SocketState) -> Result<()> {
        self.open(
            handle,
            ServiceType::UdpService,
            NO_REMOTE,
            0,
            fallback,
            true,
        )
        .await
    }

    /// Open `service` for `handle` on a fresh connection id. The socket is
    /// in `ConnectReq` until the module reports the outcome. On failure it
    /// is left in `fallback` without a connection id.
    async fn open(
        &self,
        handle: SocketHandle,
        service: ServiceType,
        remote: &str,
        remote_port: u16,
        fallback: SocketState,
        blocking: bool,
    ) -> Result<()> {
        let (id, local_port, context_id) = self.ch.with(|s| -> Result<_> {
            let socket = s.sockets.get_mut(handle)?;
            let id = s.conn_ids.alloc().ok_or(SocketError::NoMemory)?;
            socket.state = SocketState::ConnectReq;
            socket.conn_id = Some(id);
            s.flags.clear(conn_open(handle.0) | conn_close(handle.0));
            Ok((id, socket.local_port, s.settings.context_id))
        })?;
        debug!("[{}] opening {} as {}", handle.0, service.as_str(), id.raw());

        let requested = self
            .at
            .send(&OpenSocket {
                context_id,
                connect_id: id.raw(),
                service_type: service.as_str(),
                remote,
                remote_port,
                local_port,
                access_mode: AccessMode::DirectPush,
            })
            .await;
        if requested.is_err() {
            warn!("[{}] open rejected", handle.0);
            self.abort_open(handle, id, fallback);
            return Err(SocketError::TimedOut);
        }
        if !blocking {
            return Err(SocketError::InProgress);
        }

        let woke = self
            .ch
            .wait_flags(conn_open(handle.0) | conn_close(handle.0), Some(connect_time()))
            .await;
        let (state, owner) = self.ch.with(|s| {
            s.sockets
                .get(handle)
                .map(|x| (x.state, x.conn_id == Some(id)))
        })?;

        match (woke, state) {
            (_, SocketState::Connected) if owner => Ok(()),
            (Ok(_), _) => {
                debug!("[{}] open refused", handle.0);
                self.abort_open(handle, id, fallback);
                Err(SocketError::ConnectionRefused)
            }
            (Err(_), _) => {
                warn!("[{}] open timed out", handle.0);
                if owner && state == SocketState::ConnectReq {
                    // A late open would otherwise hold the id.
                    self.close_connection(id).await.ok();
                }
                self.abort_open(handle, id, fallback);
                Err(SocketError::TimedOut)
            }
        }
    }

    fn abort_open(&self, handle: SocketHandle, id: ConnId, fallback: SocketState) {
        self.ch.with(|s| {
            let Ok(socket) = s.sockets.get_mut(handle) else {
                return;
            };
            if !matches!(socket.state, SocketState::ConnectReq | SocketState::Closed) {
                return;
            }
            if socket.conn_id == Some(id) {
                socket.conn_id = None;
                s.conn_ids.free(id);
            }
            socket.state = fallback;
        });
    }

    async fn close_connection(&self, id: ConnId) -> Result<()> {
        self.at
            .send(&CloseSocket {
                connect_id: id.raw(),
                timeout: None,
            })
            .await
            .map(|_| ())
            .map_err(|_| SocketError::Unspecified)
    }

    /// Fill in remote and local address of `handle` from `+QISTATE`.
    async fn poll_link_info(&self, handle: SocketHandle) {
        let Some(id) = self
            .ch
            .with(|s| s.sockets.get(handle).ok().and_then(|x| x.conn_id))
        else {
            return;
        };
        match self.at.send(&GetSocketState { connect_id: id.raw() }).await {
            Ok(info) => self.ch.with(|s| {
                let Ok(socket) = s.sockets.get_mut(handle) else {
                    return;
                };
                if socket.conn_id != Some(id) {
                    return;
                }
                if let Ok(ip) = info.remote_ip.parse() {
                    socket.remote_ip = ip;
                }
                socket.remote_port = info.remote_port;
                if info.local_port != 0 {
                    socket.local_port = info.local_port;
                }
            }),
            Err(_) => warn!("[{}] link info unavailable", handle.0),
        }
    }
}
