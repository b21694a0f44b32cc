use no_std_net::{IpAddr, Ipv4Addr};

use super::{
    AddressFamily, ConnId, Protocol, Socket, SocketError, SocketHandle, SocketOption,
    SocketOptionId, SocketState, SocketType, SOCKET_NUM,
};

type Result<T> = core::result::Result<T, SocketError>;

/// The socket table.
///
/// Every method here is a pure registry transition. Issuing commands and
/// waiting for the module is left to the async layer, which calls these
/// with the registry lock held.
#[derive(Debug)]
pub struct SocketSet {
    sockets: [Socket; SOCKET_NUM],
}

impl Default for SocketSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketSet {
    pub const fn new() -> Self {
        const FREE: Socket = Socket::new();
        Self {
            sockets: [FREE; SOCKET_NUM],
        }
    }

    pub fn get(&self, handle: SocketHandle) -> Result<&Socket> {
        self.sockets
            .get(handle.0)
            .ok_or(SocketError::InvalidSocket)
    }

    pub fn get_mut(&mut self, handle: SocketHandle) -> Result<&mut Socket> {
        self.sockets
            .get_mut(handle.0)
            .ok_or(SocketError::InvalidSocket)
    }

    /// Like [`Self::get`], but a free slot is an invalid socket too.
    pub fn get_open(&self, handle: SocketHandle) -> Result<&Socket> {
        self.get(handle)
            .and_then(|s| match s.state {
                SocketState::Free => Err(SocketError::InvalidSocket),
                _ => Ok(s),
            })
    }

    pub fn get_open_mut(&mut self, handle: SocketHandle) -> Result<&mut Socket> {
        self.get_mut(handle).and_then(|s| match s.state {
            SocketState::Free => Err(SocketError::InvalidSocket),
            _ => Ok(s),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (SocketHandle, &Socket)> {
        self.sockets
            .iter()
            .enumerate()
            .map(|(i, s)| (SocketHandle(i), s))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SocketHandle, &mut Socket)> {
        self.sockets
            .iter_mut()
            .enumerate()
            .map(|(i, s)| (SocketHandle(i), s))
    }

    pub fn free_count(&self) -> usize {
        self.sockets
            .iter()
            .filter(|s| s.state == SocketState::Free)
            .count()
    }

    /// Socket owning `conn_id`, if any.
    pub fn find_by_conn_id(&self, conn_id: ConnId) -> Option<SocketHandle> {
        self.iter()
            .find(|(_, s)| s.state != SocketState::Free && s.conn_id == Some(conn_id))
            .map(|(h, _)| h)
    }

    /// Reset every slot to `Free`.
    pub fn reset(&mut self) {
        self.sockets.iter_mut().for_each(Socket::reset);
    }

    pub fn create(
        &mut self,
        family: AddressFamily,
        kind: SocketType,
        protocol: Option<Protocol>,
    ) -> Result<SocketHandle> {
        match family {
            AddressFamily::Inet => {}
            AddressFamily::Inet6 => return Err(SocketError::NotSupported),
        }
        let protocol = match (kind, protocol) {
            (SocketType::Stream, None | Some(Protocol::Tcp)) => Protocol::Tcp,
            (SocketType::Datagram, None | Some(Protocol::Udp)) => Protocol::Udp,
            _ => return Err(SocketError::InvalidArgument),
        };

        let (handle, socket) = self
            .iter_mut()
            .find(|(_, s)| s.state == SocketState::Free)
            .ok_or(SocketError::NoMemory)?;

        socket.reset();
        socket.state = SocketState::Created;
        socket.kind = kind;
        socket.protocol = protocol;
        debug!("[{}] created", handle.0);
        Ok(handle)
    }

    pub fn bind(&mut self, handle: SocketHandle, ip: IpAddr, port: u16) -> Result<()> {
        let ip = match ip {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => return Err(SocketError::NotSupported),
        };
        if port == 0 {
            return Err(SocketError::InvalidArgument);
        }

        match self.get_open(handle)?.state {
            SocketState::Created => {}
            SocketState::Connected => return Err(SocketError::IsConnected),
            _ => return Err(SocketError::InvalidArgument),
        }

        if self
            .sockets
            .iter()
            .any(|s| s.state >= SocketState::Bound && s.local_port == port)
        {
            return Err(SocketError::AddrInUse);
        }

        let socket = self.get_mut(handle)?;
        socket.local_ip = ip;
        socket.local_port = port;
        socket.state = SocketState::Bound;
        Ok(())
    }

    /// State gate of `listen`, before any command is issued.
    pub fn check_listen(&self, handle: SocketHandle, backlog: usize) -> Result<()> {
        let socket = self.get(handle)?;
        if backlog == 0 || backlog >= SOCKET_NUM {
            return Err(SocketError::InvalidArgument);
        }
        if socket.state != SocketState::Free && socket.kind != SocketType::Stream {
            return Err(SocketError::NotSupported);
        }
        match socket.state {
            SocketState::Free => return Err(SocketError::InvalidSocket),
            SocketState::Bound => {}
            _ => return Err(SocketError::InvalidArgument),
        }
        if self.free_count() < backlog {
            return Err(SocketError::NotSupported);
        }
        Ok(())
    }

    /// Turn `handle` into a server and materialize `backlog` slots in
    /// `Listen`, linked into a ring.
    pub fn make_server(&mut self, handle: SocketHandle, backlog: usize) -> Result<()> {
        let (kind, protocol, local_ip, local_port, non_blocking) = {
            let server = self.get(handle)?;
            (
                server.kind,
                server.protocol,
                server.local_ip,
                server.local_port,
                server.non_blocking,
            )
        };

        let mut first: Option<SocketHandle> = None;
        let mut prev: Option<SocketHandle> = None;
        let mut remaining = backlog;

        for i in 0..SOCKET_NUM {
            if remaining == 0 {
                break;
            }
            if self.sockets[i].state != SocketState::Free {
                continue;
            }
            let slot = &mut self.sockets[i];
            slot.reset();
            slot.state = SocketState::Listen;
            slot.kind = kind;
            slot.protocol = protocol;
            slot.local_ip = local_ip;
            slot.local_port = local_port;
            slot.non_blocking = non_blocking;
            slot.server = Some(handle);

            let this = SocketHandle(i);
            match prev {
                Some(p) => self.sockets[p.0].backlog = Some(this),
                None => first = Some(this),
            }
            prev = Some(this);
            remaining -= 1;
        }

        if remaining != 0 {
            // Roll back, the caller checked the free count under the same lock.
            self.release_backlog(handle);
            return Err(SocketError::NotSupported);
        }

        if let (Some(first), Some(last)) = (first, prev) {
            self.sockets[last.0].backlog = Some(first);
        }
        let server = self.get_mut(handle)?;
        server.backlog = first;
        server.state = SocketState::Server;
        debug!("[{}] listening, backlog {}", handle.0, backlog);
        Ok(())
    }

    /// Backlog slots of a server, starting at its first slot.
    pub fn backlog_ring(&self, server: SocketHandle) -> BacklogRing<'_> {
        let start = self.get(server).ok().and_then(|s| s.backlog);
        BacklogRing {
            set: self,
            start,
            next: start,
        }
    }

    /// First backlog slot holding an unaccepted connection.
    pub fn find_pending(&self, server: SocketHandle) -> Result<Option<SocketHandle>> {
        let socket = self.get(server)?;
        if socket.state != SocketState::Free && socket.kind == SocketType::Datagram {
            return Err(SocketError::NotSupported);
        }
        if socket.state != SocketState::Server {
            return Err(SocketError::InvalidSocket);
        }
        Ok(self.backlog_ring(server).find(|&slot| {
            self.sockets[slot.0].state == SocketState::Connected && !self.sockets[slot.0].accepted
        }))
    }

    /// Free listener state and every backlog slot of `server`.
    pub fn release_backlog(&mut self, server: SocketHandle) {
        for socket in self.sockets.iter_mut() {
            if socket.server == Some(server) {
                socket.reset();
            }
        }
    }

    pub fn get_opt(&self, handle: SocketHandle, id: SocketOptionId) -> Result<u32> {
        let socket = self.get_open(handle)?;
        match id {
            SocketOptionId::NonBlocking => Err(SocketError::InvalidArgument),
            SocketOptionId::RecvTimeout => Ok(socket.rx_timeout),
            SocketOptionId::SendTimeout => Ok(socket.tx_timeout),
            SocketOptionId::KeepAlive => Ok(socket.keep_alive as u32),
            SocketOptionId::Type => Ok(socket.kind as u32),
        }
    }

    pub fn set_opt(&mut self, handle: SocketHandle, option: SocketOption) -> Result<()> {
        let socket = self.get_open_mut(handle)?;
        match option {
            SocketOption::NonBlocking(on) => socket.non_blocking = on,
            SocketOption::RecvTimeout(ms) => socket.rx_timeout = ms,
            SocketOption::SendTimeout(ms) => socket.tx_timeout = ms,
            SocketOption::KeepAlive(on) => socket.keep_alive = on,
        }
        Ok(())
    }

    /// Remote address recorded for `handle`, if it is usable as a
    /// destination.
    pub fn remote(&self, handle: SocketHandle) -> Option<(Ipv4Addr, u16)> {
        let socket = self.get(handle).ok()?;
        (socket.remote_port != 0 && !socket.remote_ip.is_unspecified())
            .then_some((socket.remote_ip, socket.remote_port))
    }
}

/// Iterator over the backlog ring of a server socket.
pub struct BacklogRing<'a> {
    set: &'a SocketSet,
    start: Option<SocketHandle>,
    next: Option<SocketHandle>,
}

impl Iterator for BacklogRing<'_> {
    type Item = SocketHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let following = self.set.sockets.get(current.0).and_then(|s| s.backlog);
        self.next = match following {
            Some(h) if Some(h) != self.start => Some(h),
            _ => None,
        };
        Some(current)
    }
}
