//! AT Commands for the Quectel EG915U module family
//! Following the Quectel EG915U series AT commands manual and the
//! TCP/IP, HTTP(S) and SSL application notes.

pub mod general;
pub mod http;
pub mod ip_transport_layer;
pub mod psn;
pub mod ssl;

use atat::atat_derive::{AtatCmd, AtatResp, AtatUrc};
use atat::serde_at;

/// Largest payload moved by a single raw write.
pub const EGRESS_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, AtatResp)]
pub struct NoResponse;

#[derive(Clone, AtatCmd)]
#[at_cmd("", NoResponse, timeout_ms = 200)]
pub struct AT;

/// Final payload write after a `>` or `CONNECT` prompt. The module answers
/// with its final result code (`SEND OK`, `OK`).
#[derive(Clone, AtatCmd)]
#[at_cmd(
    "",
    NoResponse,
    value_sep = false,
    cmd_prefix = "",
    termination = "",
    timeout_ms = 10000
)]
pub struct WriteData<'a> {
    #[at_arg(position = 0, len = 1024)]
    pub data: serde_at::ser::Bytes<'a>,
}

/// Intermediate payload write. The module stays in data mode and answers
/// nothing, so the client must not wait for a result code.
#[derive(Clone)]
pub struct WriteChunk<'a>(pub &'a [u8]);

impl atat::AtatCmd for WriteChunk<'_> {
    type Response = NoResponse;

    const MAX_LEN: usize = EGRESS_CHUNK_SIZE;
    const MAX_TIMEOUT_MS: u32 = 10000;
    const EXPECTS_RESPONSE_CODE: bool = false;

    fn write(&self, buf: &mut [u8]) -> usize {
        let len = self.0.len().min(buf.len());
        buf[..len].copy_from_slice(&self.0[..len]);
        len
    }

    fn parse(
        &self,
        resp: Result<&[u8], atat::InternalError>,
    ) -> Result<Self::Response, atat::Error> {
        resp.map(|_| NoResponse).map_err(atat::Error::from)
    }
}

#[derive(Debug, Clone, AtatUrc)]
pub enum Urc {
    #[at_urc("RDY")]
    Ready,

    #[at_urc("+QIOPEN")]
    SocketOpened(ip_transport_layer::urc::SocketOpened),
    #[at_urc("+QIURC")]
    SocketEvent(ip_transport_layer::urc::SocketEvent),
    #[at_urc("+QPING")]
    Ping(ip_transport_layer::urc::PingResult),

    #[at_urc("+QHTTPGET")]
    HttpGet(http::urc::HttpResult),
    #[at_urc("+QHTTPPOST")]
    HttpPost(http::urc::HttpResult),
    #[at_urc("+QHTTPREAD")]
    HttpRead(http::urc::HttpReadResult),
}
