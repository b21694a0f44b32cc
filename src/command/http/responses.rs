//! Responses for HTTP(S) Commands
use atat::atat_derive::AtatResp;
use heapless::String;

use crate::command::ip_transport_layer::urc::Token;

/// Current value of a `+QHTTPCFG` parameter, unparsed.
#[derive(Debug, Clone, AtatResp)]
pub struct HttpConfig {
    #[at_arg(position = 0)]
    pub name: String<16>,
    #[at_arg(position = 1)]
    pub value: Option<Token>,
}
