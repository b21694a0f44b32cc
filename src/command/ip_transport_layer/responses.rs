//! Responses for TCP/IP Commands
use atat::atat_derive::AtatResp;
use heapless::String;

use super::types::LinkState;

/// 2.3.4 Query socket service status +QISTATE
#[derive(Debug, Clone, AtatResp)]
pub struct SocketState {
    #[at_arg(position = 0)]
    pub connect_id: u8,
    #[at_arg(position = 1)]
    pub service_type: String<16>,
    #[at_arg(position = 2)]
    pub remote_ip: String<40>,
    #[at_arg(position = 3)]
    pub remote_port: u16,
    #[at_arg(position = 4)]
    pub local_port: u16,
    #[at_arg(position = 5)]
    pub state: LinkState,
    #[at_arg(position = 6)]
    pub context_id: u8,
    #[at_arg(position = 7)]
    pub server_id: u8,
}

/// 2.3.15 Configure DNS server address +QIDNSCFG
#[derive(Debug, Clone, AtatResp)]
pub struct DnsServers {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1)]
    pub primary: String<40>,
    #[at_arg(position = 2)]
    pub secondary: String<40>,
}
