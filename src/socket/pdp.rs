//! PDP context bound pseudo sockets, used for HTTP transfers.

use core::fmt;

use no_std_net::Ipv4Addr;

use super::SocketError;
use crate::command::psn::types::ContextType;
use crate::flags::EventFlags;
use crate::http::handoff::ChunkHandoff;

pub const PDP_SOCKET_NUM: usize = 2;
/// Size of each half of the response handoff.
pub const HTTP_CHUNK_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdpHandle(pub usize);

impl fmt::Display for PdpHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdpState {
    Free,
    /// Context active, no transfer running
    Created,
    /// Transfer finished, ready for the next one
    Bound,
    /// Request opened, transfer running
    Connected,
}

pub struct PdpSocket {
    pub(crate) state: PdpState,
    pub(crate) context_id: u8,
    pub(crate) context_type: ContextType,
    pub(crate) ip: Ipv4Addr,
    pub(crate) events: EventFlags,
    pub(crate) handoff: ChunkHandoff<HTTP_CHUNK_SIZE>,
}

impl PdpSocket {
    pub const fn new() -> Self {
        Self {
            state: PdpState::Free,
            context_id: 0,
            context_type: ContextType::Ipv4,
            ip: Ipv4Addr::UNSPECIFIED,
            events: EventFlags::new(),
            handoff: ChunkHandoff::new(),
        }
    }

    pub fn state(&self) -> PdpState {
        self.state
    }

    pub fn context_id(&self) -> u8 {
        self.context_id
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Whether a request may be started on this socket.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, PdpState::Created | PdpState::Bound)
    }

    fn reset(&mut self) {
        self.state = PdpState::Free;
        self.context_id = 0;
        self.context_type = ContextType::Ipv4;
        self.ip = Ipv4Addr::UNSPECIFIED;
        self.events.clear(u32::MAX);
        self.handoff.reset();
    }
}

impl Default for PdpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PdpSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdpSocket")
            .field("state", &self.state)
            .field("context_id", &self.context_id)
            .field("ip", &self.ip)
            .finish()
    }
}

pub struct PdpSocketSet {
    sockets: [PdpSocket; PDP_SOCKET_NUM],
}

impl Default for PdpSocketSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PdpSocketSet {
    pub const fn new() -> Self {
        const FREE: PdpSocket = PdpSocket::new();
        Self {
            sockets: [FREE; PDP_SOCKET_NUM],
        }
    }

    pub fn get(&self, handle: PdpHandle) -> Result<&PdpSocket, SocketError> {
        self.sockets
            .get(handle.0)
            .ok_or(SocketError::InvalidSocket)
    }

    pub fn get_mut(&mut self, handle: PdpHandle) -> Result<&mut PdpSocket, SocketError> {
        self.sockets
            .get_mut(handle.0)
            .ok_or(SocketError::InvalidSocket)
    }

    /// Bind a free slot to an activated context. A context that already
    /// owns a slot gets it back.
    pub fn bind(
        &mut self,
        context_id: u8,
        context_type: ContextType,
        ip: Ipv4Addr,
    ) -> Result<PdpHandle, SocketError> {
        let existing = self
            .sockets
            .iter()
            .position(|s| s.state != PdpState::Free && s.context_id == context_id);
        let free = || self.sockets.iter().position(|s| s.state == PdpState::Free);
        let index = existing.or_else(free).ok_or(SocketError::NoMemory)?;

        let socket = &mut self.sockets[index];
        if existing.is_none() {
            socket.reset();
            socket.state = PdpState::Created;
        }
        socket.context_id = context_id;
        socket.context_type = context_type;
        socket.ip = ip;
        debug!("[pdp {}] bound to context {}", index, context_id);
        Ok(PdpHandle(index))
    }

    pub fn release(&mut self, handle: PdpHandle) -> Result<(), SocketError> {
        self.get_mut(handle)?.reset();
        Ok(())
    }

    /// Socket with a transfer in flight, if any.
    pub fn connected(&self) -> Option<PdpHandle> {
        self.sockets
            .iter()
            .position(|s| s.state == PdpState::Connected)
            .map(PdpHandle)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PdpSocket> {
        self.sockets.iter_mut()
    }

    pub fn reset(&mut self) {
        self.sockets.iter_mut().for_each(PdpSocket::reset);
    }
}
