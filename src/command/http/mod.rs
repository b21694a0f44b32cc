//! ### HTTP(S) Commands
pub mod responses;
pub mod types;
pub mod urc;

use atat::atat_derive::AtatCmd;
use responses::*;

use super::NoResponse;

/// Configure a numeric HTTP(S) parameter +QHTTPCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPCFG", NoResponse, timeout_ms = 10000)]
pub struct SetHttpNumber<'a> {
    #[at_arg(position = 0, len = 16)]
    pub name: &'a str,
    #[at_arg(position = 1)]
    pub value: u8,
}

/// Configure a text HTTP(S) parameter +QHTTPCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPCFG", NoResponse, timeout_ms = 10000)]
pub struct SetHttpText<'a> {
    #[at_arg(position = 0, len = 16)]
    pub name: &'a str,
    #[at_arg(position = 1, len = 256)]
    pub value: &'a str,
}

/// Query an HTTP(S) parameter +QHTTPCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPCFG", HttpConfig, timeout_ms = 10000)]
pub struct GetHttpConfig<'a> {
    #[at_arg(position = 0, len = 16)]
    pub name: &'a str,
}

/// Value-less HTTP(S) configuration such as `"reset"` +QHTTPCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPCFG", NoResponse, timeout_ms = 10000)]
pub struct HttpConfigAction<'a> {
    #[at_arg(position = 0, len = 16)]
    pub name: &'a str,
}

/// Set the URL of an HTTP(S) server +QHTTPURL
///
/// Answers `CONNECT`, after which exactly `length` bytes of URL are
/// written within `timeout` seconds.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPURL", NoResponse, timeout_ms = 5000)]
pub struct SetUrl {
    #[at_arg(position = 0)]
    pub length: usize,
    #[at_arg(position = 1)]
    pub timeout: u16,
}

/// Send a GET request +QHTTPGET
///
/// With a host supplied request header, `data_length` bytes of header are
/// written after `CONNECT`. The outcome is reported with `+QHTTPGET`.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPGET", NoResponse, timeout_ms = 5000)]
pub struct HttpGet {
    #[at_arg(position = 0)]
    pub rsptime: u16,
    #[at_arg(position = 1)]
    pub data_length: Option<usize>,
    #[at_arg(position = 2)]
    pub input_time: Option<u16>,
}

/// Send a POST request +QHTTPPOST
///
/// `data_length` bytes of header and body are written after `CONNECT`. The
/// outcome is reported with `+QHTTPPOST`.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPPOST", NoResponse, timeout_ms = 5000)]
pub struct HttpPost {
    #[at_arg(position = 0)]
    pub data_length: usize,
    #[at_arg(position = 1)]
    pub input_time: u16,
    #[at_arg(position = 2)]
    pub rsptime: u16,
}

/// Read the response of an HTTP(S) server +QHTTPREAD
///
/// The body follows `CONNECT` on the data plane, `+QHTTPREAD: <err>`
/// terminates the transfer.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QHTTPREAD", NoResponse, timeout_ms = 60000)]
pub struct ReadResponse {
    #[at_arg(position = 0)]
    pub wait_time: u16,
}
