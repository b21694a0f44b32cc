//! HTTP(S) request descriptors for the module's HTTP client.

pub mod handoff;

use core::fmt::Write;

use heapless::String;

pub use handoff::{ChunkHandoff, ChunkInfo};

/// Capacity of a generated request header.
pub const HTTP_HEADER_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> HeaderField<'a> {
    pub const fn new(name: &'a str, value: &'a str) -> Self {
        Self { name, value }
    }
}

/// Request body.
pub enum Body<'a> {
    None,
    Slice(&'a [u8]),
    /// `length` bytes produced on demand. The producer is called with the
    /// running offset, the bytes still owed and a scratch buffer, and
    /// returns how many bytes it wrote. Anything past the remaining length
    /// is ignored.
    Producer {
        length: usize,
        produce: &'a mut dyn FnMut(usize, usize, &mut [u8]) -> usize,
    },
}

impl Body<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Slice(data) => data.len(),
            Self::Producer { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the response body goes.
pub enum ResponseSink<'a> {
    Discard,
    /// Read at most `buf.len()` bytes into `buf`
    Buffer(&'a mut [u8]),
    /// Called once per handed-off chunk with the data and its [`ChunkInfo`]
    Callback(&'a mut dyn FnMut(&[u8], ChunkInfo)),
}

pub struct HttpRequest<'a> {
    pub method: HttpMethod,
    /// Full URL including the scheme
    pub url: &'a str,
    /// Custom request header fields. When given, the whole request header is
    /// generated by the driver and sent ahead of the body.
    pub headers: Option<&'a [HeaderField<'a>]>,
    pub body: Body<'a>,
    pub response: ResponseSink<'a>,
    /// Output the response header with the body
    pub response_header: bool,
    /// Input timeout of URL and body in seconds
    pub timeout: u16,
    /// Time to wait for the response in seconds
    pub resptime: u16,
}

impl<'a> HttpRequest<'a> {
    pub fn get(url: &'a str) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: None,
            body: Body::None,
            response: ResponseSink::Discard,
            response_header: false,
            timeout: 60,
            resptime: 60,
        }
    }

    pub fn post(url: &'a str, body: Body<'a>) -> Self {
        Self {
            method: HttpMethod::Post,
            body,
            ..Self::get(url)
        }
    }

    pub fn with_headers(mut self, headers: &'a [HeaderField<'a>]) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_response(mut self, response: ResponseSink<'a>) -> Self {
        self.response = response;
        self
    }

    pub fn with_timeouts(mut self, timeout: u16, resptime: u16) -> Self {
        self.timeout = timeout;
        self.resptime = resptime;
        self
    }

    pub fn is_secure(&self) -> bool {
        is_secure(self.url)
    }
}

/// Outcome of a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u32>,
    /// Body bytes handed to the sink
    pub read: usize,
}

pub fn is_secure(url: &str) -> bool {
    url.as_bytes()
        .get(..8)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case(b"https://"))
}

/// Split `url` into host and path. The path defaults to `/`.
pub fn split_url(url: &str) -> Option<(&str, &str)> {
    let (_, rest) = url.split_once("//")?;
    match rest.find('/') {
        Some(at) => Some((&rest[..at], &rest[at..])),
        None => Some((rest, "/")),
    }
}

/// Render the request line and header fields, terminated by an empty line.
/// `Content-Length` is only emitted for a non-empty body.
pub fn build_header<const N: usize>(
    method: HttpMethod,
    url: &str,
    fields: &[HeaderField<'_>],
    content_length: usize,
) -> Option<String<N>> {
    let (host, path) = split_url(url)?;
    let mut out = String::new();

    write!(out, "{} {} HTTP/1.1\r\nHost: {}\r\n", method.as_str(), path, host).ok()?;
    for field in fields {
        write!(out, "{}: {}\r\n", field.name, field.value).ok()?;
    }
    if content_length != 0 {
        write!(out, "Content-Length: {}\r\n", content_length).ok()?;
    }
    out.push_str("\r\n").ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parts() {
        assert_eq!(
            split_url("http://example.com/index.html?a=1"),
            Some(("example.com", "/index.html?a=1"))
        );
        assert_eq!(
            split_url("https://example.com:8443"),
            Some(("example.com:8443", "/"))
        );
        assert_eq!(split_url("example.com/x"), None);
        assert!(is_secure("HTTPS://example.com"));
        assert!(!is_secure("http://example.com"));
        assert!(!is_secure("https:"));
    }

    #[test]
    fn post_header() {
        let fields = [
            HeaderField::new("Content-Type", "application/json"),
            HeaderField::new("Authorization", "Bearer t"),
        ];
        let header: String<256> =
            build_header(HttpMethod::Post, "http://api.example.com/v1/data", &fields, 17).unwrap();
        assert_eq!(
            header.as_str(),
            "POST /v1/data HTTP/1.1\r\n\
             Host: api.example.com\r\n\
             Content-Type: application/json\r\n\
             Authorization: Bearer t\r\n\
             Content-Length: 17\r\n\
             \r\n"
        );
    }

    #[test]
    fn get_header_without_body() {
        let header: String<64> =
            build_header(HttpMethod::Get, "http://example.com", &[], 0).unwrap();
        assert_eq!(
            header.as_str(),
            "GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"
        );
        assert!(build_header::<16>(HttpMethod::Get, "http://example.com", &[], 0).is_none());
    }
}
