//! Responses for PDP context Commands
use atat::atat_derive::AtatResp;
use heapless::String;

use super::types::{AuthMethod, ContextType};

/// 2.3.2 TCP/IP context parameters +QICSGP
#[derive(Debug, Clone, AtatResp)]
pub struct ContextParameters {
    #[at_arg(position = 0)]
    pub context_type: ContextType,
    #[at_arg(position = 1)]
    pub apn: String<64>,
    #[at_arg(position = 2)]
    pub username: String<64>,
    #[at_arg(position = 3)]
    pub password: String<64>,
    #[at_arg(position = 4)]
    pub authentication: AuthMethod,
}

/// 10.2 PDP address +CGPADDR
#[derive(Debug, Clone, AtatResp)]
pub struct PdpAddress {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1)]
    pub address: String<40>,
}
