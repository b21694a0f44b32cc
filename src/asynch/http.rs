//! HTTP(S) requests through the module's HTTP client.
//!
//! A request holds the command channel from configuration to the end of the
//! response. The body is drained through the PDP socket's chunk handoff
//! while `+QHTTPREAD` is still running.

use core::fmt::Write as _;

use atat::asynch::AtatClient;
use atat::serde_at;
use embassy_futures::join::join;
use embassy_time::Duration;
use heapless::String;

use super::control::Control;
use super::{write_payload, Egress};
use crate::command::http::types::{HttpOption, HttpOptionName, HttpOptionValue};
use crate::command::http::{
    GetHttpConfig, HttpConfigAction, HttpGet, HttpPost, ReadResponse, SetHttpNumber,
    SetHttpText, SetUrl,
};
use crate::command::ip_transport_layer::urc::Token;
use crate::command::ssl::types::{SecurityLevel, SslOption, SslVersion};
use crate::command::ssl::{SetSslNumber, SetSslRaw, SetSslText};
use crate::command::EGRESS_CHUNK_SIZE;
use crate::error::Error;
use crate::flags::{self, HANDOFF_COMPLETE, HANDOFF_CONSUMED, HANDOFF_FAIL, HANDOFF_PARTIAL};
use crate::http::{
    build_header, Body, HttpMethod, HttpRequest, HttpResponse, ResponseSink,
    HTTP_HEADER_CAPACITY,
};
use crate::module_timing::response_time;
use crate::socket::pdp::HTTP_CHUNK_SIZE;
use crate::socket::{PdpHandle, PdpState, SocketError};

/// SSL context set up for `https://` URLs.
const SSL_CONTEXT_ID: u8 = 1;
const SSL_CONTEXT_MAX: u8 = 5;
const CIPHER_SUITE_ALL: u16 = 0xFFFF;

impl<'d, AT: AtatClient> Control<'d, AT> {
    pub async fn http_set_option(&self, option: HttpOption<'_>) -> Result<(), Error> {
        let mut at = self.at.lock().await;
        http_config(&mut *at, option).await
    }

    /// Raw value of an HTTP(S) parameter, `None` when the module reports
    /// none.
    pub async fn http_get_option(&self, name: HttpOptionName) -> Result<Option<Token>, Error> {
        Ok(self
            .at
            .send(&GetHttpConfig {
                name: name.as_str(),
            })
            .await?
            .value)
    }

    pub async fn ssl_set_option(
        &self,
        ssl_context_id: u8,
        option: SslOption<'_>,
    ) -> Result<(), Error> {
        if ssl_context_id > SSL_CONTEXT_MAX {
            return Err(Error::Parameter);
        }
        let mut at = self.at.lock().await;
        ssl_config(&mut *at, ssl_context_id, option).await
    }

    /// Set the URL of the next request. `timeout` is the input time in
    /// seconds.
    pub async fn set_url(&self, url: &str, timeout: u16) -> Result<(), Error> {
        let mut at = self.at.lock().await;
        send_url(&mut *at, url, timeout).await
    }

    /// Run `request` on the context bound to `handle`.
    ///
    /// Returns the HTTP status once the response body went to the request's
    /// sink. A non-zero module error is reported as [`Error::Http`].
    pub async fn http(
        &self,
        handle: PdpHandle,
        request: &mut HttpRequest<'_>,
    ) -> Result<HttpResponse, Error> {
        if request.url.is_empty() {
            return Err(Error::Parameter);
        }
        if matches!(&request.response, ResponseSink::Buffer(buf) if buf.is_empty()) {
            return Err(Error::Parameter);
        }

        let mut at = self.at.lock().await;
        let context_id = self.ch.with(|s| -> Result<u8, Error> {
            let pdp = s.pdp.get(handle)?;
            match pdp.state() {
                PdpState::Free => Err(SocketError::InvalidSocket.into()),
                _ if !pdp.is_idle() => Err(SocketError::NotSupported.into()),
                _ => Ok(pdp.context_id()),
            }
        })?;

        let result = self.transfer(&mut *at, handle, context_id, request).await;

        self.ch.with(|s| {
            if let Ok(pdp) = s.pdp.get_mut(handle) {
                if pdp.state == PdpState::Connected {
                    pdp.state = PdpState::Bound;
                }
                pdp.handoff.reset();
            }
        });
        if let Err(e) = &result {
            warn!("[pdp {}] request failed: {:?}", handle.0, e);
        }
        result
    }

    async fn transfer(
        &self,
        at: &mut AT,
        handle: PdpHandle,
        context_id: u8,
        request: &mut HttpRequest<'_>,
    ) -> Result<HttpResponse, Error> {
        http_config(at, HttpOption::ContextId(context_id)).await?;

        let header = match request.headers {
            Some(fields) => Some(
                build_header::<HTTP_HEADER_CAPACITY>(
                    request.method,
                    request.url,
                    fields,
                    request.body.len(),
                )
                .ok_or(Error::Parameter)?,
            ),
            None => None,
        };
        http_config(at, HttpOption::RequestHeader(header.is_some())).await?;
        http_config(at, HttpOption::ResponseHeader(request.response_header)).await?;

        if request.is_secure() {
            http_config(at, HttpOption::SslContextId(SSL_CONTEXT_ID)).await?;
            ssl_config(at, SSL_CONTEXT_ID, SslOption::Version(SslVersion::All)).await?;
            ssl_config(at, SSL_CONTEXT_ID, SslOption::CipherSuite(CIPHER_SUITE_ALL)).await?;
            ssl_config(at, SSL_CONTEXT_ID, SslOption::SecurityLevel(SecurityLevel::None)).await?;
        }

        send_url(at, request.url, request.timeout).await?;

        self.ch.with(|s| -> Result<(), Error> {
            s.pdp.get_mut(handle)?.state = PdpState::Connected;
            s.http = None;
            s.flags.clear(flags::HTTP_RESPONSE);
            Ok(())
        })?;

        let header_len = header.as_ref().map_or(0, |h| h.len());
        let length = header_len + request.body.len();
        match request.method {
            HttpMethod::Get if header.is_none() => {
                at.send(&HttpGet {
                    rsptime: request.resptime,
                    data_length: None,
                    input_time: None,
                })
                .await?;
            }
            HttpMethod::Get => {
                at.send(&HttpGet {
                    rsptime: request.resptime,
                    data_length: Some(length),
                    input_time: Some(request.timeout),
                })
                .await?;
            }
            HttpMethod::Post => {
                at.send(&HttpPost {
                    data_length: length,
                    input_time: request.timeout,
                    rsptime: request.resptime,
                })
                .await?;
            }
        }

        let mut egress = Egress::new(at, length);
        if let Some(header) = &header {
            egress.write(header.as_bytes()).await?;
        }
        if header.is_some() || request.method == HttpMethod::Post {
            write_body(&mut egress, &mut request.body).await?;
        }

        let resptime = Duration::from_secs(request.resptime as u64) + response_time();
        self.ch
            .wait_flags(flags::HTTP_RESPONSE, Some(resptime))
            .await?;
        let info = self
            .ch
            .with(|s| s.http.take())
            .ok_or(Error::Unspecified)?;
        if info.err != 0 {
            return Err(Error::Http(info.err));
        }
        let status = info.status.unwrap_or(0);
        debug!("[pdp {}] status {}", handle.0, status);

        let declared = info.content_length.map(|n| n as usize);
        let limit = match &request.response {
            ResponseSink::Discard => Some(0),
            ResponseSink::Buffer(buf) => Some(declared.map_or(buf.len(), |n| n.min(buf.len()))),
            ResponseSink::Callback(_) => declared,
        };
        let mut response = HttpResponse {
            status,
            content_length: info.content_length,
            read: 0,
        };
        if limit == Some(0) {
            return Ok(response);
        }
        let bounded = match &request.response {
            ResponseSink::Buffer(_) if declared.is_none() => None,
            _ => limit,
        };

        self.ch.with(|s| -> Result<(), Error> {
            let pdp = s.pdp.get_mut(handle)?;
            pdp.events.clear(u32::MAX);
            pdp.handoff.begin(bounded);
            s.http_read_err = None;
            s.flags.clear(flags::HTTP_READ);
            Ok(())
        })?;

        let wait_time = request.resptime;
        let read = async {
            let result = at.send(&ReadResponse { wait_time }).await;
            if result.is_err() {
                self.ch.with(|s| s.fail_transfers());
            }
            result
        };
        let (sent, drained) = join(
            read,
            self.drain(handle, &mut request.response, resptime),
        )
        .await;
        sent?;
        response.read = drained?;

        self.ch.wait_flags(flags::HTTP_READ, Some(response_time())).await?;
        match self.ch.with(|s| s.http_read_err.take()) {
            Some(0) | None => Ok(response),
            Some(err) => Err(Error::Http(err)),
        }
    }

    /// Hand every chunk of the running transfer to `sink`. Returns the
    /// number of body bytes delivered.
    async fn drain(
        &self,
        handle: PdpHandle,
        sink: &mut ResponseSink<'_>,
        timeout: Duration,
    ) -> Result<usize, Error> {
        let mut scratch = [0u8; HTTP_CHUNK_SIZE];
        let mut read = 0;

        loop {
            let signal = self
                .ch
                .wait_pdp_flags(
                    handle,
                    HANDOFF_PARTIAL | HANDOFF_COMPLETE | HANDOFF_FAIL,
                    Some(timeout),
                )
                .await
                .map_err(|_| {
                    self.ch.with(|s| s.fail_transfers());
                    Error::Timeout
                })?;
            if signal & HANDOFF_FAIL != 0 {
                let err = self.ch.with(|s| s.http_read_err).unwrap_or(0);
                return Err(match err {
                    0 => Error::Unspecified,
                    err => Error::Http(err),
                });
            }

            loop {
                let out: &mut [u8] = match sink {
                    ResponseSink::Buffer(buf) => {
                        let start = read.min(buf.len());
                        &mut buf[start..]
                    }
                    _ => &mut scratch,
                };
                let chunk = self.ch.with(|s| {
                    let pdp = s.pdp.get_mut(handle).ok()?;
                    let chunk = pdp.handoff.consume(out)?;
                    pdp.events.set(HANDOFF_CONSUMED);
                    Some(chunk)
                });
                let Some((n, info)) = chunk else {
                    break;
                };
                if let ResponseSink::Callback(callback) = sink {
                    callback(&scratch[..n], info);
                }
                read += n;
                trace!("[pdp {}] chunk {} of {} bytes", handle.0, info.index, info.size);
                if info.last {
                    return Ok(read);
                }
            }
        }
    }
}

async fn write_body<AT: AtatClient>(
    egress: &mut Egress<'_, AT>,
    body: &mut Body<'_>,
) -> Result<(), Error> {
    match body {
        Body::None => Ok(()),
        Body::Slice(data) => Ok(egress.write(data).await?),
        Body::Producer { length, produce } => {
            let mut scratch = [0u8; EGRESS_CHUNK_SIZE];
            let mut offset = 0;
            while offset < *length {
                let remaining = *length - offset;
                let room = remaining.min(scratch.len());
                let n = produce(offset, remaining, &mut scratch[..room]).min(room);
                if n == 0 {
                    warn!("Body producer stopped {} bytes short", remaining);
                    return Err(Error::Parameter);
                }
                egress.write(&scratch[..n]).await?;
                offset += n;
            }
            Ok(())
        }
    }
}

async fn send_url<AT: AtatClient>(at: &mut AT, url: &str, timeout: u16) -> Result<(), Error> {
    if url.is_empty() {
        return Err(Error::Parameter);
    }
    at.send(&SetUrl {
        length: url.len(),
        timeout,
    })
    .await?;
    write_payload(at, url.as_bytes()).await?;
    Ok(())
}

async fn http_config<AT: AtatClient>(at: &mut AT, option: HttpOption<'_>) -> Result<(), Error> {
    let name = option.name();
    match option.value() {
        HttpOptionValue::Number(value) => at.send(&SetHttpNumber { name, value }).await?,
        HttpOptionValue::Text(value) => at.send(&SetHttpText { name, value }).await?,
        HttpOptionValue::None => at.send(&HttpConfigAction { name }).await?,
    };
    Ok(())
}

async fn ssl_config<AT: AtatClient>(
    at: &mut AT,
    ssl_context_id: u8,
    option: SslOption<'_>,
) -> Result<(), Error> {
    let name = option.name();
    let number = |value: u32| SetSslNumber {
        name,
        ssl_context_id,
        value,
    };
    match option {
        SslOption::Version(v) => at.send(&number(v as u32)).await?,
        SslOption::SecurityLevel(level) => at.send(&number(level as u32)).await?,
        SslOption::NegotiateTime(secs) => at.send(&number(secs as u32)).await?,
        SslOption::IgnoreLocalTime(on)
        | SslOption::Sni(on)
        | SslOption::IgnoreMultiCertChainVerify(on)
        | SslOption::IgnoreInvalidCertSign(on)
        | SslOption::Dtls(on) => at.send(&number(on as u32)).await?,
        SslOption::CaCert(path) | SslOption::ClientCert(path) | SslOption::ClientKey(path) => {
            at.send(&SetSslText {
                name,
                ssl_context_id,
                value: path,
            })
            .await?
        }
        SslOption::CipherSuite(suite) => {
            let mut hex: String<8> = String::new();
            write!(hex, "0x{:04X}", suite).map_err(|_| Error::Parameter)?;
            at.send(&SetSslRaw {
                name,
                ssl_context_id,
                value: serde_at::ser::Bytes(hex.as_bytes()),
            })
            .await?
        }
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use atat::UrcChannel;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use no_std_net::Ipv4Addr;

    use super::*;
    use crate::asynch::event::{Chunk, Event, HttpResponseInfo};
    use crate::asynch::runner::Runner;
    use crate::asynch::{new, State};
    use crate::command::psn::types::ContextType;
    use crate::command::Urc;
    use crate::http::{ChunkInfo, HeaderField};
    use crate::test_helpers::{until_sent, Log, MockAtClient, TestConfig};

    fn with_pdp(test: impl FnOnce(&Control<'_, MockAtClient>, &Runner<'_, 4>, PdpHandle, Log)) {
        let at = MockAtClient::new();
        let log = at.log();
        let mut state = State::new(at);
        let urc_channel = UrcChannel::<Urc, 4, 2>::new();
        let (control, _sockets, runner, _notifier) =
            new(&mut state, &urc_channel, TestConfig).unwrap();
        let pdp = runner
            .ch
            .with(|s| s.pdp.bind(1, ContextType::Ipv4, Ipv4Addr::new(10, 0, 0, 2)))
            .unwrap();
        test(&control, &runner, pdp, log);
    }

    fn response(err: u16, status: u16, content_length: Option<u32>) -> Event {
        Event::HttpResponse(HttpResponseInfo {
            err,
            status: Some(status),
            content_length,
        })
    }

    async fn content(runner: &Runner<'_, 4>, data: &[u8]) {
        for piece in data.chunks(256) {
            runner
                .handle(Event::HttpContent(Chunk::from_slice(piece).unwrap()))
                .await;
        }
    }

    fn idle(runner: &Runner<'_, 4>, pdp: PdpHandle) -> bool {
        runner.ch.with(|s| s.pdp.get(pdp).unwrap().is_idle())
    }

    #[test]
    fn get_into_buffer() {
        with_pdp(|control, runner, pdp, log| {
            let mut buf = [0u8; 64];
            let mut request = HttpRequest::get("http://example.com/status")
                .with_response(ResponseSink::Buffer(&mut buf));

            let (result, _) = block_on(join(control.http(pdp, &mut request), async {
                until_sent(&log, "+QHTTPGET", 1).await;
                runner.handle(response(0, 200, Some(11))).await;
                until_sent(&log, "+QHTTPREAD", 1).await;
                content(runner, b"hello world").await;
                runner.handle(Event::HttpReadDone { err: 0 }).await;
            }));
            drop(request);

            assert_eq!(
                result,
                Ok(HttpResponse {
                    status: 200,
                    content_length: Some(11),
                    read: 11
                })
            );
            assert_eq!(&buf[..11], b"hello world");
            assert_eq!(
                log.borrow().commands(),
                [
                    "AT+QHTTPCFG=\"contextid\",1\r\n",
                    "AT+QHTTPCFG=\"requestheader\",0\r\n",
                    "AT+QHTTPCFG=\"responseheader\",0\r\n",
                    "AT+QHTTPURL=25,60\r\n",
                    "http://example.com/status",
                    "AT+QHTTPGET=60\r\n",
                    "AT+QHTTPREAD=60\r\n",
                ]
            );
            assert!(idle(runner, pdp));
        });
    }

    #[test]
    fn streamed_response_chunks() {
        with_pdp(|control, runner, pdp, log| {
            let mut seen: Vec<ChunkInfo> = Vec::new();
            let mut body: Vec<u8> = Vec::new();
            let mut on_chunk = |data: &[u8], info: ChunkInfo| {
                body.extend_from_slice(data);
                seen.push(info);
            };
            let mut request = HttpRequest::get("http://example.com/fw.bin")
                .with_response(ResponseSink::Callback(&mut on_chunk));

            let payload: Vec<u8> = (0..1200u32).map(|i| i as u8).collect();
            let (result, _) = block_on(join(control.http(pdp, &mut request), async {
                until_sent(&log, "+QHTTPGET", 1).await;
                runner.handle(response(0, 200, Some(1200))).await;
                until_sent(&log, "+QHTTPREAD", 1).await;
                content(runner, &payload).await;
                runner.handle(Event::HttpReadDone { err: 0 }).await;
            }));
            drop(request);

            assert_eq!(result.map(|r| r.read), Ok(1200));
            assert_eq!(body, payload);
            let sizes: Vec<usize> = seen.iter().map(|c| c.size).collect();
            assert_eq!(sizes, [512, 512, 176]);
            let remaining: Vec<usize> = seen.iter().map(|c| c.remaining).collect();
            assert_eq!(remaining, [688, 176, 0]);
            assert_eq!(seen.iter().filter(|c| c.last).count(), 1);
            assert!(seen[2].last);
        });
    }

    #[test]
    fn post_with_generated_header() {
        with_pdp(|control, runner, pdp, log| {
            let fields = [HeaderField::new("Content-Type", "application/json")];
            let mut request = HttpRequest::post(
                "https://api.example.com/v1/data",
                Body::Slice(b"{\"t\":21}"),
            )
            .with_headers(&fields);

            let (result, _) = block_on(join(control.http(pdp, &mut request), async {
                until_sent(&log, "+QHTTPPOST", 1).await;
                runner.handle(response(0, 201, Some(0))).await;
            }));
            assert_eq!(result.map(|r| r.status), Ok(201));

            let header = "POST /v1/data HTTP/1.1\r\n\
                          Host: api.example.com\r\n\
                          Content-Type: application/json\r\n\
                          Content-Length: 8\r\n\
                          \r\n";
            let log = log.borrow();
            assert_eq!(log.matching("requestheader"), ["AT+QHTTPCFG=\"requestheader\",1\r\n"]);
            assert_eq!(log.matching("sslctxid"), ["AT+QHTTPCFG=\"sslctxid\",1\r\n"]);
            assert_eq!(
                log.matching("+QSSLCFG"),
                [
                    "AT+QSSLCFG=\"sslversion\",1,4\r\n",
                    "AT+QSSLCFG=\"ciphersuite\",1,0xFFFF\r\n",
                    "AT+QSSLCFG=\"seclevel\",1,0\r\n",
                ]
            );
            let expected = std::format!("AT+QHTTPPOST={},60,60\r\n", header.len() + 8);
            assert_eq!(log.matching("+QHTTPPOST"), [expected]);
            assert_eq!(log.matching("POST /v1"), [header]);
            assert_eq!(log.matching("{\"t\""), ["{\"t\":21}"]);
            assert!(log.matching("+QHTTPREAD").is_empty());
            // Only the body completes the announced length.
            let awaited = log.awaited();
            assert_eq!(&awaited[awaited.len() - 2..], [false, true]);
        });
    }

    #[test]
    fn produced_body() {
        with_pdp(|control, runner, pdp, log| {
            let mut calls = Vec::new();
            let mut produce = |offset: usize, remaining: usize, out: &mut [u8]| {
                calls.push((offset, remaining));
                let n = remaining.min(out.len()).min(700);
                out[..n].fill(b'z');
                n
            };
            let mut request = HttpRequest::post(
                "http://example.com/upload",
                Body::Producer {
                    length: 1500,
                    produce: &mut produce,
                },
            );

            let (result, _) = block_on(join(control.http(pdp, &mut request), async {
                until_sent(&log, "+QHTTPPOST", 1).await;
                runner.handle(response(0, 204, None)).await;
            }));
            drop(request);
            assert_eq!(result.map(|r| r.status), Ok(204));
            assert_eq!(calls, [(0, 1500), (700, 800), (1400, 100)]);
            assert_eq!(
                log.borrow().matching("zzz").iter().map(|c| c.len()).sum::<usize>(),
                1500
            );
        });
    }

    #[test]
    fn module_error_is_reported() {
        with_pdp(|control, runner, pdp, log| {
            let mut request = HttpRequest::get("http://unreachable.example");
            let (result, _) = block_on(join(control.http(pdp, &mut request), async {
                until_sent(&log, "+QHTTPGET", 1).await;
                runner.handle(response(702, 0, None)).await;
            }));
            assert_eq!(result, Err(Error::Http(702)));
            assert!(idle(runner, pdp));

            runner
                .ch
                .with(|s| s.pdp.get_mut(pdp).unwrap().state = PdpState::Connected);
            let mut request = HttpRequest::get("http://example.com");
            assert_eq!(
                block_on(control.http(pdp, &mut request)),
                Err(Error::Socket(SocketError::NotSupported))
            );
            assert_eq!(
                block_on(control.http(PdpHandle(1), &mut request)),
                Err(Error::Socket(SocketError::InvalidSocket))
            );
        });
    }

    #[test]
    fn release_unblocks_a_stalled_transfer() {
        with_pdp(|control, runner, pdp, log| {
            let mut buf = [0u8; 16];
            let mut request = HttpRequest::get("http://example.com/slow")
                .with_response(ResponseSink::Buffer(&mut buf));

            let (result, _) = block_on(join(control.http(pdp, &mut request), async {
                until_sent(&log, "+QHTTPGET", 1).await;
                runner.handle(response(0, 200, Some(100))).await;
                until_sent(&log, "+QHTTPREAD", 1).await;
                content(runner, b"partial").await;
                // The channel is still held by the request.
                assert_eq!(control.release(), Err(Error::Busy));
            }));
            assert_eq!(result, Err(Error::Unspecified));
            assert_eq!(control.release(), Ok(()));
        });
    }

    #[test]
    fn options() {
        with_pdp(|control, _runner, _pdp, log| {
            block_on(async {
                control
                    .http_set_option(HttpOption::Header("X-Id: 7"))
                    .await
                    .unwrap();
                control.http_set_option(HttpOption::Reset).await.unwrap();
                control
                    .ssl_set_option(2, SslOption::CaCert("UFS:cacert.pem"))
                    .await
                    .unwrap();
                assert_eq!(
                    control.ssl_set_option(6, SslOption::Sni(true)).await,
                    Err(Error::Parameter)
                );
                control.set_url("http://example.com", 30).await.unwrap();
            });
            assert_eq!(
                log.borrow().commands(),
                [
                    "AT+QHTTPCFG=\"header\",\"X-Id: 7\"\r\n",
                    "AT+QHTTPCFG=\"reset\"\r\n",
                    "AT+QSSLCFG=\"cacert\",2,\"UFS:cacert.pem\"\r\n",
                    "AT+QHTTPURL=18,30\r\n",
                    "http://example.com",
                ]
            );
        });
    }
}
