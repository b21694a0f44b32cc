//! ### 2 - TCP/IP Commands
//!
pub mod responses;
pub mod types;
pub mod urc;

use atat::atat_derive::AtatCmd;
use responses::*;
use types::*;

use super::NoResponse;

/// 2.3.5 Open a socket service +QIOPEN
///
/// Opens a client connection, a UDP service or a TCP listener on
/// `<connectID>`. The final result code only acknowledges the request, the
/// outcome is reported with the `+QIOPEN: <connectID>,<err>` notification.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIOPEN", NoResponse, timeout_ms = 5000)]
pub struct OpenSocket<'a> {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1)]
    pub connect_id: u8,
    #[at_arg(position = 2, len = 16)]
    pub service_type: &'a str,
    #[at_arg(position = 3, len = 64)]
    pub remote: &'a str,
    #[at_arg(position = 4)]
    pub remote_port: u16,
    #[at_arg(position = 5)]
    pub local_port: u16,
    #[at_arg(position = 6)]
    pub access_mode: AccessMode,
}

/// 2.3.6 Close a socket service +QICLOSE
///
/// If the peer does not acknowledge the FIN within `<timeout>` seconds the
/// connection is closed forcibly.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QICLOSE", NoResponse, timeout_ms = 12000)]
pub struct CloseSocket {
    #[at_arg(position = 0)]
    pub connect_id: u8,
    #[at_arg(position = 1)]
    pub timeout: Option<u8>,
}

/// 2.3.7 Query socket service status +QISTATE
#[derive(Clone, AtatCmd)]
#[at_cmd("+QISTATE=1,", SocketState, value_sep = false)]
pub struct GetSocketState {
    #[at_arg(position = 0)]
    pub connect_id: u8,
}

/// 2.3.9 Send data +QISEND
///
/// Answers with the `>` prompt, after which exactly `length` bytes are
/// written with [`super::WriteChunk`] / [`super::WriteData`]. The module
/// terminates the transfer with `SEND OK` or `SEND FAIL`. The destination is
/// only given for `UDP SERVICE` connections.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QISEND", NoResponse, timeout_ms = 5000)]
pub struct PrepareSend<'a> {
    #[at_arg(position = 0)]
    pub connect_id: u8,
    #[at_arg(position = 1)]
    pub length: usize,
    #[at_arg(position = 2, len = 16)]
    pub remote_ip: Option<&'a str>,
    #[at_arg(position = 3)]
    pub remote_port: Option<u16>,
}

/// 2.3.14 Ping a remote server +QPING
///
/// The replies are reported with `+QPING` notifications.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QPING", NoResponse, timeout_ms = 5000)]
pub struct Ping<'a> {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1, len = 64)]
    pub host: &'a str,
    /// Reply timeout in seconds
    #[at_arg(position = 2)]
    pub timeout: u8,
    #[at_arg(position = 3)]
    pub count: u8,
}

/// 2.3.15 Configure address of DNS server +QIDNSCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDNSCFG", NoResponse)]
pub struct SetDnsServers<'a> {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1, len = 16)]
    pub primary: &'a str,
    #[at_arg(position = 2, len = 16)]
    pub secondary: &'a str,
}

/// 2.3.15 Query address of DNS server +QIDNSCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDNSCFG", DnsServers)]
pub struct GetDnsServers {
    #[at_arg(position = 0)]
    pub context_id: u8,
}

/// 2.3.16 Get IP address by domain name +QIDNSGIP
///
/// The result is reported with `+QIURC: "dnsgip"` notifications.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDNSGIP", NoResponse, timeout_ms = 5000)]
pub struct ResolveHostname<'a> {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1, len = 128)]
    pub hostname: &'a str,
}
