//! Socket and PDP registries.
//!
//! Both tables are fixed arenas addressed by index. Cross references between
//! slots (`server`, `backlog`) are plain handles, never references, so a
//! recycled slot can not be reached through a stale pointer.

pub mod conn_id;
pub mod pdp;
mod ring_buffer;
mod set;

use core::fmt;

use no_std_net::Ipv4Addr;

pub use self::conn_id::{ConnId, ConnIdAllocator, CONN_ID_INVALID, CONN_ID_NUM};
pub use self::pdp::{PdpHandle, PdpSocket, PdpSocketSet, PdpState, PDP_SOCKET_NUM};
pub use self::ring_buffer::RingBuffer;
pub use self::set::SocketSet;

/// Number of socket control blocks.
pub const SOCKET_NUM: usize = 5;
/// Receive queue size of each socket, framing headers included.
pub const SOCKET_RX_BUFFER: usize = 2048;
/// Datagrams of this size or larger can not be sent atomically.
pub const MAX_DATAGRAM: usize = 2048;
/// Size of the length prefix in front of every queued packet.
pub const FRAME_HEADER_LEN: usize = 2;

/// Socket descriptor handed out by `create` and `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketHandle(pub usize);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Socket layer error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketError {
    Unspecified,
    InvalidSocket,
    InvalidArgument,
    NotSupported,
    NoMemory,
    WouldBlock,
    InProgress,
    TimedOut,
    IsConnected,
    NotConnected,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    Already,
    AddrInUse,
    HostNotFound,
}

impl SocketError {
    /// Negative status code of the socket error taxonomy.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Unspecified => -1,
            Self::InvalidSocket => -2,
            Self::InvalidArgument => -3,
            Self::NotSupported => -4,
            Self::NoMemory => -5,
            Self::WouldBlock => -6,
            Self::InProgress => -7,
            Self::TimedOut => -8,
            Self::IsConnected => -9,
            Self::NotConnected => -10,
            Self::ConnectionRefused => -11,
            Self::ConnectionReset => -12,
            Self::ConnectionAborted => -13,
            Self::Already => -14,
            Self::AddrInUse => -15,
            Self::HostNotFound => -16,
        }
    }
}

impl From<atat::Error> for SocketError {
    fn from(e: atat::Error) -> Self {
        match e {
            atat::Error::Timeout => Self::TimedOut,
            _ => Self::Unspecified,
        }
    }
}

impl From<embassy_time::TimeoutError> for SocketError {
    fn from(_: embassy_time::TimeoutError) -> Self {
        Self::WouldBlock
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressFamily {
    Inet,
    Inet6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketType {
    Stream = 1,
    Datagram = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Lifecycle of a socket control block. Ordering matters: "at least bound"
/// is `>= Bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketState {
    Free,
    Created,
    Bound,
    Listen,
    ConnectReq,
    Connected,
    Closing,
    Closed,
    Server,
}

/// Settable socket options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    NonBlocking(bool),
    /// Receive timeout in ms, `0` waits forever
    RecvTimeout(u32),
    /// Send timeout in ms, `0` waits forever
    SendTimeout(u32),
    KeepAlive(bool),
}

/// Readable socket options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOptionId {
    /// Write-only, reading it is an invalid argument
    NonBlocking,
    RecvTimeout,
    SendTimeout,
    KeepAlive,
    Type,
}

/// Socket control block.
#[derive(Debug)]
pub struct Socket {
    pub(crate) state: SocketState,
    pub(crate) kind: SocketType,
    pub(crate) protocol: Protocol,
    pub(crate) conn_id: Option<ConnId>,
    pub(crate) non_blocking: bool,
    pub(crate) keep_alive: bool,
    pub(crate) local_ip: Ipv4Addr,
    pub(crate) local_port: u16,
    pub(crate) remote_ip: Ipv4Addr,
    pub(crate) remote_port: u16,
    /// Bytes left of the packet currently being read
    pub(crate) rx_len: u16,
    pub(crate) rx_timeout: u32,
    pub(crate) tx_timeout: u32,
    /// Listening socket owning this backlog slot
    pub(crate) server: Option<SocketHandle>,
    /// Next backlog slot in the ring. On the server, the first slot
    pub(crate) backlog: Option<SocketHandle>,
    pub(crate) accepted: bool,
    pub(crate) rx: RingBuffer<SOCKET_RX_BUFFER>,
}

impl Socket {
    pub const fn new() -> Self {
        Self {
            state: SocketState::Free,
            kind: SocketType::Stream,
            protocol: Protocol::Tcp,
            conn_id: None,
            non_blocking: false,
            keep_alive: false,
            local_ip: Ipv4Addr::UNSPECIFIED,
            local_port: 0,
            remote_ip: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            rx_len: 0,
            rx_timeout: 0,
            tx_timeout: 0,
            server: None,
            backlog: None,
            accepted: false,
            rx: RingBuffer::new(),
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn kind(&self) -> SocketType {
        self.kind
    }

    pub fn conn_id(&self) -> Option<ConnId> {
        self.conn_id
    }

    pub fn is_stream(&self) -> bool {
        self.kind == SocketType::Stream
    }

    /// Reset everything but the receive queue storage.
    pub(crate) fn reset(&mut self) {
        self.state = SocketState::Free;
        self.kind = SocketType::Stream;
        self.protocol = Protocol::Tcp;
        self.conn_id = None;
        self.non_blocking = false;
        self.keep_alive = false;
        self.local_ip = Ipv4Addr::UNSPECIFIED;
        self.local_port = 0;
        self.remote_ip = Ipv4Addr::UNSPECIFIED;
        self.remote_port = 0;
        self.rx_len = 0;
        self.rx_timeout = 0;
        self.tx_timeout = 0;
        self.server = None;
        self.backlog = None;
        self.accepted = false;
        self.rx.clear();
    }

    /// Put a backlog slot back into `Listen` for the next connection.
    pub(crate) fn recycle(&mut self) {
        self.state = SocketState::Listen;
        self.conn_id = None;
        self.accepted = false;
        self.remote_ip = Ipv4Addr::UNSPECIFIED;
        self.remote_port = 0;
        self.rx_len = 0;
        self.rx.clear();
    }

    /// Queue a packet header. Returns `false` when the packet does not fit
    /// and must be discarded.
    pub(crate) fn push_frame_header(&mut self, len: u16) -> bool {
        if self.rx.window() < len as usize + FRAME_HEADER_LEN {
            return false;
        }
        self.rx.enqueue_slice(&len.to_le_bytes());
        true
    }

    /// Make the next queued packet current, if its header has arrived.
    pub(crate) fn load_frame_header(&mut self) -> bool {
        if self.rx_len != 0 {
            return true;
        }
        match self.rx.peek_u16() {
            Some(len) => {
                self.rx.dequeue_allocated(FRAME_HEADER_LEN);
                self.rx_len = len;
                true
            }
            None => false,
        }
    }

    /// Read from the current packet into `buf`.
    ///
    /// Datagram reads are atomic: nothing is returned until the whole packet
    /// is queued, then what does not fit into `buf` is dropped. Stream reads
    /// take whatever is queued. Returns the byte count and whether the
    /// packet is finished.
    pub(crate) fn read_frame(&mut self, buf: &mut [u8]) -> (usize, bool) {
        let pending = self.rx_len as usize;
        match self.kind {
            SocketType::Datagram => {
                if self.rx.len() < pending {
                    return (0, false);
                }
                let take = core::cmp::min(buf.len(), pending);
                let n = self.rx.dequeue_slice(&mut buf[..take]);
                self.rx.dequeue_allocated(pending - n);
                self.rx_len = 0;
                (n, true)
            }
            SocketType::Stream => {
                let take = core::cmp::min(buf.len(), pending);
                let n = self.rx.dequeue_slice(&mut buf[..take]);
                self.rx_len -= n as u16;
                (n, self.rx_len == 0)
            }
        }
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

/// `0` means wait forever.
pub(crate) fn timeout_from_ms(ms: u32) -> Option<embassy_time::Duration> {
    (ms != 0).then(|| embassy_time::Duration::from_millis(ms as u64))
}
