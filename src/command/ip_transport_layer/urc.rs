//! Unsolicited responses for TCP/IP Commands
use core::str::FromStr;

use atat::atat_derive::AtatResp;
use atat::heapless_bytes::Bytes;
use heapless::String;
use no_std_net::Ipv4Addr;

/// Raw parameter of a multi-form notification, quotes included.
pub type Token = Bytes<48>;

/// +QIOPEN: <connectID>,<err>
#[derive(Debug, Clone, AtatResp)]
pub struct SocketOpened {
    #[at_arg(position = 0)]
    pub connect_id: u8,
    #[at_arg(position = 1)]
    pub err: u16,
}

/// +QIURC: "<kind>"[,...]
///
/// The parameter list depends on `kind`, use [`SocketEvent::classify`] to
/// get at the typed form.
#[derive(Debug, Clone, AtatResp)]
pub struct SocketEvent {
    #[at_arg(position = 0)]
    pub kind: String<16>,
    #[at_arg(position = 1)]
    pub first: Option<Token>,
    #[at_arg(position = 2)]
    pub second: Option<Token>,
    #[at_arg(position = 3)]
    pub third: Option<Token>,
    #[at_arg(position = 4)]
    pub fourth: Option<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketNotification {
    /// `"recv",<id>,<len>[,"<ip>",<port>]`, payload follows on the data plane
    Recv {
        connect_id: u8,
        len: u16,
        remote: Option<(Ipv4Addr, u16)>,
    },
    /// `"closed",<id>`
    Closed { connect_id: u8 },
    /// `"incoming",<id>,<serverID>,"<ip>",<port>`
    Incoming {
        connect_id: u8,
        server_id: u8,
        remote_ip: Ipv4Addr,
        remote_port: u16,
    },
    /// `"incoming full"`
    IncomingFull,
    /// `"pdpdeact",<contextID>`
    PdpDeactivated { context_id: u8 },
    /// `"dnsgip",<err>,<count>,<ttl>`
    DnsStatus { err: u16, count: u8 },
    /// `"dnsgip","<ip>"`
    DnsAddress(Ipv4Addr),
}

impl SocketEvent {
    pub fn classify(&self) -> Option<SocketNotification> {
        let first = raw(&self.first);
        let second = raw(&self.second);
        let third = raw(&self.third);
        let fourth = raw(&self.fourth);

        match self.kind.as_str() {
            "recv" => {
                let remote = match (third.and_then(parse_ipv4), fourth.and_then(parse_u16)) {
                    (Some(ip), Some(port)) => Some((ip, port)),
                    _ => None,
                };
                Some(SocketNotification::Recv {
                    connect_id: parse_u8(first?)?,
                    len: parse_u16(second?)?,
                    remote,
                })
            }
            "closed" => Some(SocketNotification::Closed {
                connect_id: parse_u8(first?)?,
            }),
            "incoming" => Some(SocketNotification::Incoming {
                connect_id: parse_u8(first?)?,
                server_id: parse_u8(second?)?,
                remote_ip: parse_ipv4(third?)?,
                remote_port: parse_u16(fourth?)?,
            }),
            "incoming full" => Some(SocketNotification::IncomingFull),
            "pdpdeact" => Some(SocketNotification::PdpDeactivated {
                context_id: parse_u8(first?)?,
            }),
            "dnsgip" => {
                let first = first?;
                if is_quoted(first) {
                    parse_ipv4(first).map(SocketNotification::DnsAddress)
                } else {
                    Some(SocketNotification::DnsStatus {
                        err: parse_u16(first)?,
                        count: second.and_then(parse_u8).unwrap_or(0),
                    })
                }
            }
            _ => None,
        }
    }
}

/// +QPING: <result>[,...]
///
/// Per-reply form: `<result>,"<ip>",<bytes>,<time>,<ttl>`.
/// Summary form: `<finresult>,<sent>,<rcvd>,<lost>,<min>,<max>,<avg>`.
#[derive(Debug, Clone, AtatResp)]
pub struct PingResult {
    #[at_arg(position = 0)]
    pub result: u16,
    #[at_arg(position = 1)]
    pub first: Option<Token>,
    #[at_arg(position = 2)]
    pub second: Option<u32>,
    #[at_arg(position = 3)]
    pub third: Option<u32>,
    #[at_arg(position = 4)]
    pub fourth: Option<u32>,
    #[at_arg(position = 5)]
    pub fifth: Option<u32>,
    #[at_arg(position = 6)]
    pub sixth: Option<u32>,
}

impl PingResult {
    /// Round trip time in ms when this is a per-reply line.
    pub fn reply_time(&self) -> Option<u32> {
        match raw(&self.first) {
            Some(host) if is_quoted(host) => self.third,
            _ => None,
        }
    }

    pub fn is_summary(&self) -> bool {
        !raw(&self.first).is_some_and(is_quoted)
    }
}

fn raw(token: &Option<Token>) -> Option<&[u8]> {
    token.as_ref().map(|t| t.as_ref())
}

fn is_quoted(raw: &[u8]) -> bool {
    raw.len() >= 2 && raw[0] == b'"' && raw[raw.len() - 1] == b'"'
}

/// Strips surrounding quotes and whitespace from a raw parameter.
pub fn unquote(raw: &[u8]) -> &[u8] {
    let raw = raw.trim_ascii();
    if is_quoted(raw) {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

fn parse<T: FromStr>(raw: &[u8]) -> Option<T> {
    core::str::from_utf8(unquote(raw)).ok()?.parse().ok()
}

pub fn parse_u8(raw: &[u8]) -> Option<u8> {
    parse(raw)
}

pub fn parse_u16(raw: &[u8]) -> Option<u16> {
    parse(raw)
}

pub fn parse_ipv4(raw: &[u8]) -> Option<Ipv4Addr> {
    parse(raw)
}
