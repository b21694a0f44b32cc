//! Unsolicited responses for HTTP(S) Commands
use atat::atat_derive::AtatResp;

/// +QHTTPGET / +QHTTPPOST: <err>[,<httprspcode>[,<content_length>]]
#[derive(Debug, Clone, AtatResp)]
pub struct HttpResult {
    #[at_arg(position = 0)]
    pub err: u16,
    #[at_arg(position = 1)]
    pub status: Option<u16>,
    #[at_arg(position = 2)]
    pub content_length: Option<u32>,
}

/// +QHTTPREAD: <err>
#[derive(Debug, Clone, AtatResp)]
pub struct HttpReadResult {
    #[at_arg(position = 0)]
    pub err: u16,
}
