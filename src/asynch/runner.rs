use atat::UrcSubscription;
use embassy_futures::select::{select, Either};

use super::event::{Event, EventChannel, HttpResponseInfo, LinkInfo};
use super::state::{self, Dispatched};
use crate::command::ip_transport_layer::urc::{SocketNotification, SocketOpened};
use crate::command::Urc;
use crate::module_timing::response_time;
use crate::socket::PdpHandle;

pub(crate) const URC_SUBSCRIBERS: usize = 2;

/// Background runner for the EG915U driver.
///
/// Feeds module notifications and transport events into the dispatcher.
/// You must call `.run()` in a background task for the driver to operate.
pub struct Runner<'d, const URC_CAPACITY: usize> {
    pub(crate) ch: state::Runner<'d>,
    events: &'d EventChannel,
    urc_subscription: UrcSubscription<'d, Urc, URC_CAPACITY, URC_SUBSCRIBERS>,
}

impl<'d, const URC_CAPACITY: usize> Runner<'d, URC_CAPACITY> {
    pub(crate) fn new(
        ch: state::Runner<'d>,
        events: &'d EventChannel,
        urc_subscription: UrcSubscription<'d, Urc, URC_CAPACITY, URC_SUBSCRIBERS>,
    ) -> Self {
        Self {
            ch,
            events,
            urc_subscription,
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let event = match select(
                self.urc_subscription.next_message_pure(),
                self.events.receive(),
            )
            .await
            {
                Either::First(urc) => match urc_event(urc) {
                    Some(event) => event,
                    None => continue,
                },
                Either::Second(event) => event,
            };
            self.handle(event).await;
        }
    }

    pub(crate) async fn handle(&self, event: Event) {
        trace!("Dispatching {}", event_name(&event));
        let content = match &event {
            Event::HttpContent(chunk) => Some(chunk.clone()),
            _ => None,
        };

        let Dispatched {
            notify,
            backpressure,
        } = self.ch.dispatch(event);

        if let Some(notify) = notify {
            if let Some(callback) = self.ch.with(|s| s.callback) {
                callback(notify);
            }
        }
        if let (Some((handle, taken)), Some(content)) = (backpressure, content) {
            self.push_back(handle, &content[taken..]).await;
        }
    }

    /// Hand the rest of a response chunk over as the consumer makes room.
    async fn push_back(&self, handle: PdpHandle, mut rest: &[u8]) {
        while !rest.is_empty() {
            if self
                .ch
                .wait_handoff_room(handle, response_time())
                .await
                .is_err()
            {
                warn!("[pdp {}] response consumer stalled, abandoning transfer", handle.0);
                self.ch.with(|s| s.fail_transfers());
                return;
            }
            let taken = self.ch.with(|s| s.feed_http(handle, rest));
            rest = &rest[taken..];
        }
    }
}

/// Translate a line notification into a dispatcher event.
///
/// `"recv"` headers are not forwarded, their payload reaches the driver
/// through the [`Notifier`](super::event::Notifier) together with its
/// header so the two can not be reordered.
pub(crate) fn urc_event(urc: Urc) -> Option<Event> {
    let event = match urc {
        Urc::Ready => Event::Ready,
        Urc::SocketOpened(SocketOpened { connect_id, err: 0 }) => {
            Event::ConnectionOpened(LinkInfo {
                conn_id: connect_id,
                server: false,
                server_id: None,
                local_port: 0,
                remote: None,
            })
        }
        Urc::SocketOpened(SocketOpened { connect_id, err }) => Event::ConnectionFailed {
            conn_id: connect_id,
            err,
        },
        Urc::SocketEvent(event) => match event.classify()? {
            SocketNotification::Recv { connect_id, len, .. } => {
                trace!("recv {} bytes on {}", len, connect_id);
                return None;
            }
            SocketNotification::Closed { connect_id } => Event::ConnectionClosed {
                conn_id: connect_id,
            },
            SocketNotification::Incoming {
                connect_id,
                server_id,
                remote_ip,
                remote_port,
            } => Event::ConnectionOpened(LinkInfo {
                conn_id: connect_id,
                server: true,
                server_id: Some(server_id),
                local_port: 0,
                remote: Some((remote_ip, remote_port)),
            }),
            SocketNotification::IncomingFull => {
                warn!("Incoming connection refused, module backlog full");
                return None;
            }
            SocketNotification::PdpDeactivated { context_id } => {
                warn!("Context {} deactivated by the network", context_id);
                Event::LinkDisconnected
            }
            SocketNotification::DnsStatus { err, count } if err != 0 || count == 0 => {
                Event::DnsResolved(None)
            }
            SocketNotification::DnsStatus { .. } => return None,
            SocketNotification::DnsAddress(ip) => Event::DnsResolved(Some(ip)),
        },
        Urc::Ping(ping) => match ping.reply_time() {
            Some(time_ms) => Event::PingReply {
                result: ping.result,
                time_ms,
            },
            None if ping.is_summary() && ping.result != 0 => Event::PingReply {
                result: ping.result,
                time_ms: 0,
            },
            None => return None,
        },
        Urc::HttpGet(result) | Urc::HttpPost(result) => Event::HttpResponse(HttpResponseInfo {
            err: result.err,
            status: result.status,
            content_length: result.content_length,
        }),
        Urc::HttpRead(result) => Event::HttpReadDone { err: result.err },
    };
    Some(event)
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::Execute => "Execute",
        Event::Ready => "Ready",
        Event::ConnectionOpened(_) => "ConnectionOpened",
        Event::ControlConnectionOpened { .. } => "ControlConnectionOpened",
        Event::ConnectionFailed { .. } => "ConnectionFailed",
        Event::ConnectionClosed { .. } => "ConnectionClosed",
        Event::RxHeader { .. } => "RxHeader",
        Event::RxData(_) => "RxData",
        Event::HttpResponse(_) => "HttpResponse",
        Event::HttpContent(_) => "HttpContent",
        Event::HttpReadDone { .. } => "HttpReadDone",
        Event::DnsResolved(_) => "DnsResolved",
        Event::PingReply { .. } => "PingReply",
        Event::StationConnected(_) => "StationConnected",
        Event::StationDisconnected(_) => "StationDisconnected",
        Event::LinkConnected => "LinkConnected",
        Event::GotIp => "GotIp",
        Event::LinkDisconnected => "LinkDisconnected",
        Event::ErrorCode(_) => "ErrorCode",
        Event::OutOfMemory { .. } => "OutOfMemory",
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use atat::UrcChannel;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use heapless::String;
    use no_std_net::Ipv4Addr;

    use super::*;
    use crate::asynch::event::{Chunk, DriverEvent};
    use crate::asynch::state::State;
    use crate::command::http::urc::HttpResult;
    use crate::command::ip_transport_layer::urc::{PingResult, SocketEvent, Token};
    use crate::command::psn::types::ContextType;
    use crate::flags::{HANDOFF_COMPLETE, HANDOFF_CONSUMED, HANDOFF_PARTIAL};
    use crate::socket::PdpState;

    fn socket_event(kind: &str, params: &[&[u8]]) -> Urc {
        let token = |i: usize| params.get(i).map(|p| Token::from_slice(p).unwrap());
        Urc::SocketEvent(SocketEvent {
            kind: String::try_from(kind).unwrap(),
            first: token(0),
            second: token(1),
            third: token(2),
            fourth: token(3),
        })
    }

    #[test]
    fn open_results() {
        assert_eq!(
            urc_event(Urc::SocketOpened(SocketOpened {
                connect_id: 2,
                err: 0
            })),
            Some(Event::ConnectionOpened(LinkInfo {
                conn_id: 2,
                server: false,
                server_id: None,
                local_port: 0,
                remote: None,
            }))
        );
        assert_eq!(
            urc_event(Urc::SocketOpened(SocketOpened {
                connect_id: 2,
                err: 563
            })),
            Some(Event::ConnectionFailed {
                conn_id: 2,
                err: 563
            })
        );
    }

    #[test]
    fn socket_notifications() {
        assert_eq!(
            urc_event(socket_event("incoming", &[b"1", b"0", b"\"10.0.0.9\"", b"5000"])),
            Some(Event::ConnectionOpened(LinkInfo {
                conn_id: 1,
                server: true,
                server_id: Some(0),
                local_port: 0,
                remote: Some((Ipv4Addr::new(10, 0, 0, 9), 5000)),
            }))
        );
        assert_eq!(
            urc_event(socket_event("closed", &[b"3"])),
            Some(Event::ConnectionClosed { conn_id: 3 })
        );
        assert_eq!(urc_event(socket_event("recv", &[b"3", b"10"])), None);
        assert_eq!(
            urc_event(socket_event("pdpdeact", &[b"1"])),
            Some(Event::LinkDisconnected)
        );
        assert_eq!(urc_event(socket_event("dnsgip", &[b"0", b"2", b"600"])), None);
        assert_eq!(
            urc_event(socket_event("dnsgip", &[b"0", b"0", b"600"])),
            Some(Event::DnsResolved(None))
        );
        assert_eq!(
            urc_event(socket_event("dnsgip", &[b"\"1.2.3.4\""])),
            Some(Event::DnsResolved(Some(Ipv4Addr::new(1, 2, 3, 4))))
        );
    }

    #[test]
    fn ping_and_http_results() {
        let failed = PingResult {
            result: 569,
            first: None,
            second: None,
            third: None,
            fourth: None,
            fifth: None,
            sixth: None,
        };
        assert_eq!(
            urc_event(Urc::Ping(failed)),
            Some(Event::PingReply {
                result: 569,
                time_ms: 0
            })
        );
        let summary = PingResult {
            result: 0,
            first: Some(Token::from_slice(b"4").unwrap()),
            ..failed_ping()
        };
        assert_eq!(urc_event(Urc::Ping(summary)), None);

        assert_eq!(
            urc_event(Urc::HttpPost(HttpResult {
                err: 0,
                status: Some(200),
                content_length: Some(12),
            })),
            Some(Event::HttpResponse(HttpResponseInfo {
                err: 0,
                status: Some(200),
                content_length: Some(12),
            }))
        );
    }

    fn failed_ping() -> PingResult {
        PingResult {
            result: 0,
            first: None,
            second: None,
            third: None,
            fourth: None,
            fifth: None,
            sixth: None,
        }
    }

    thread_local! {
        static LAST_EVENT: Cell<Option<DriverEvent>> = const { Cell::new(None) };
    }

    fn record(event: DriverEvent) {
        LAST_EVENT.with(|last| last.set(Some(event)));
    }

    #[test]
    fn callback_runs_outside_the_lock() {
        let mut state = State::new();
        let ch = state::Runner::new(&mut state);
        let events = EventChannel::new();
        let urcs = UrcChannel::<Urc, 4, URC_SUBSCRIBERS>::new();
        let runner = Runner::new(ch, &events, urcs.subscribe().unwrap());

        ch.with(|s| s.callback = Some(record));
        block_on(runner.handle(Event::StationDisconnected([9; 6])));
        assert_eq!(
            LAST_EVENT.with(Cell::get),
            Some(DriverEvent::Disconnect([9; 6]))
        );
    }

    #[test]
    fn stalled_content_waits_for_the_consumer() {
        let mut state = State::new();
        let ch = state::Runner::new(&mut state);
        let events = EventChannel::new();
        let urcs = UrcChannel::<Urc, 4, URC_SUBSCRIBERS>::new();
        let runner = Runner::new(ch, &events, urcs.subscribe().unwrap());

        let pdp = ch.with(|s| {
            let handle = s
                .pdp
                .bind(1, ContextType::Ipv4, Ipv4Addr::new(10, 0, 0, 2))
                .unwrap();
            let socket = s.pdp.get_mut(handle).unwrap();
            socket.state = PdpState::Connected;
            socket.handoff.begin(Some(1536));
            handle
        });

        let producer = async {
            for i in 0..6u8 {
                runner
                    .handle(Event::HttpContent(Chunk::from_slice(&[i; 256]).unwrap()))
                    .await;
            }
        };
        let consumer = async {
            let mut body = std::vec::Vec::new();
            let mut buf = [0u8; 512];
            loop {
                let signal = ch
                    .wait_pdp_flags(pdp, HANDOFF_PARTIAL | HANDOFF_COMPLETE, None)
                    .await
                    .unwrap();
                while let Some((n, _)) = ch.with(|s| {
                    let socket = s.pdp.get_mut(pdp).unwrap();
                    let drained = socket.handoff.consume(&mut buf);
                    if drained.is_some() {
                        socket.events.set(HANDOFF_CONSUMED);
                    }
                    drained
                }) {
                    body.extend_from_slice(&buf[..n]);
                }
                if signal & HANDOFF_COMPLETE != 0 {
                    return body;
                }
            }
        };

        let ((), body) = block_on(join(producer, consumer));
        assert_eq!(body.len(), 1536);
        for (i, piece) in body.chunks(256).enumerate() {
            assert!(piece.iter().all(|&b| b == i as u8));
        }
    }
}
