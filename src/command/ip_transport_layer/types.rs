//! Argument and parameter types used by TCP/IP Commands and Responses
use atat::atat_derive::AtatEnum;

/// `<service_type>` of `+QIOPEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Tcp,
    /// Unconnected UDP, every send names its destination
    UdpService,
    TcpListener,
}

impl ServiceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::UdpService => "UDP SERVICE",
            Self::TcpListener => "TCP LISTENER",
        }
    }
}

/// `<access_mode>` of `+QIOPEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum AccessMode {
    /// Data is read with `+QIRD` after a `"recv"` notification
    Buffer = 0,
    /// Data is pushed with the `"recv"` notification
    DirectPush = 1,
    Transparent = 2,
}

/// `<socket_state>` of `+QISTATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum LinkState {
    Initial = 0,
    Opening = 1,
    Connected = 2,
    Listening = 3,
    Closing = 4,
}
