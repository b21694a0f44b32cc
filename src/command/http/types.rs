//! Argument and parameter types used by HTTP(S) Commands
use atat::atat_derive::AtatEnum;

/// `<content_type>` of `+QHTTPCFG="contenttype"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum ContentType {
    FormUrlEncoded = 0,
    TextPlain = 1,
    OctetStream = 2,
    MultipartFormData = 3,
}

/// A `+QHTTPCFG` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpOption<'a> {
    ContextId(u8),
    /// Request header is supplied by the host with the request body
    RequestHeader(bool),
    /// Response header is included in the response body
    ResponseHeader(bool),
    SslContextId(u8),
    ContentType(ContentType),
    /// Response body is output automatically instead of via `+QHTTPREAD`
    AutoOutResponse(bool),
    ClosedIndication(bool),
    /// Single custom request header line, `name: value`
    Header(&'a str),
    /// `username:password`
    Auth(&'a str),
    Reset,
}

/// Name of a `+QHTTPCFG` parameter, used for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpOptionName {
    ContextId,
    RequestHeader,
    ResponseHeader,
    SslContextId,
    ContentType,
    AutoOutResponse,
    ClosedIndication,
    Header,
    Auth,
}

impl HttpOptionName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ContextId => "contextid",
            Self::RequestHeader => "requestheader",
            Self::ResponseHeader => "responseheader",
            Self::SslContextId => "sslctxid",
            Self::ContentType => "contenttype",
            Self::AutoOutResponse => "rspout/auto",
            Self::ClosedIndication => "closed/ind",
            Self::Header => "header",
            Self::Auth => "auth",
        }
    }
}

/// Argument of a `+QHTTPCFG` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpOptionValue<'a> {
    Number(u8),
    Text(&'a str),
    None,
}

impl<'a> HttpOption<'a> {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ContextId(_) => HttpOptionName::ContextId.as_str(),
            Self::RequestHeader(_) => HttpOptionName::RequestHeader.as_str(),
            Self::ResponseHeader(_) => HttpOptionName::ResponseHeader.as_str(),
            Self::SslContextId(_) => HttpOptionName::SslContextId.as_str(),
            Self::ContentType(_) => HttpOptionName::ContentType.as_str(),
            Self::AutoOutResponse(_) => HttpOptionName::AutoOutResponse.as_str(),
            Self::ClosedIndication(_) => HttpOptionName::ClosedIndication.as_str(),
            Self::Header(_) => HttpOptionName::Header.as_str(),
            Self::Auth(_) => HttpOptionName::Auth.as_str(),
            Self::Reset => "reset",
        }
    }

    pub fn value(&self) -> HttpOptionValue<'a> {
        match *self {
            Self::ContextId(id) | Self::SslContextId(id) => HttpOptionValue::Number(id),
            Self::RequestHeader(on)
            | Self::ResponseHeader(on)
            | Self::AutoOutResponse(on)
            | Self::ClosedIndication(on) => HttpOptionValue::Number(on as u8),
            Self::ContentType(ct) => HttpOptionValue::Number(ct as u8),
            Self::Header(text) | Self::Auth(text) => HttpOptionValue::Text(text),
            Self::Reset => HttpOptionValue::None,
        }
    }
}
