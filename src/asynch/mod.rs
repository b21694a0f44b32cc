pub mod control;
pub mod event;
mod http;
pub mod runner;
pub mod sockets;
pub mod state;

use core::fmt::Write as _;

use atat::asynch::AtatClient;
use atat::{serde_at, AtatCmd, UrcChannel};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use heapless::String;
use no_std_net::Ipv4Addr;

use self::control::Control;
use self::event::{EventChannel, Notifier};
use self::runner::{Runner, URC_SUBSCRIBERS};
use self::sockets::Sockets;
use self::state::Settings;
use crate::command::{Urc, WriteChunk, WriteData, EGRESS_CHUNK_SIZE};
use crate::config::{CellularConfig, CONTEXT_ID_DEFAULT};
use crate::error::Error;

/// The command channel. Whoever holds the lock owns the one command in
/// flight.
pub struct AtHandle<'d, AT: AtatClient>(&'d Mutex<NoopRawMutex, AT>);

impl<AT: AtatClient> Clone for AtHandle<'_, AT> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<AT: AtatClient> Copy for AtHandle<'_, AT> {}

impl<'d, AT: AtatClient> AtHandle<'d, AT> {
    /// Hold the channel across a command sequence that must not interleave
    /// with others, like a send prompt and its payload.
    pub(crate) async fn lock(&self) -> MutexGuard<'d, NoopRawMutex, AT> {
        self.0.lock().await
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.0.try_lock().is_err()
    }

    async fn send<Cmd: AtatCmd>(&self, cmd: &Cmd) -> Result<Cmd::Response, atat::Error> {
        self.0.lock().await.send_retry::<Cmd>(cmd).await
    }
}

pub struct State<AT: AtatClient> {
    ch: state::State,
    events: EventChannel,
    at_handle: Mutex<NoopRawMutex, AT>,
}

impl<AT: AtatClient> State<AT> {
    pub fn new(at_handle: AT) -> Self {
        Self {
            ch: state::State::new(),
            events: EventChannel::new(),
            at_handle: Mutex::new(at_handle),
        }
    }
}

/// Split the driver into its handles.
///
/// `Runner::run` must be polled in a background task, and the transport
/// pushes data plane payload through the returned [`Notifier`].
pub fn new<'a, AT: AtatClient, C: CellularConfig, const URC_CAPACITY: usize>(
    state: &'a mut State<AT>,
    urc_channel: &'a UrcChannel<Urc, URC_CAPACITY, URC_SUBSCRIBERS>,
    _config: C,
) -> Result<
    (
        Control<'a, AT>,
        Sockets<'a, AT>,
        Runner<'a, URC_CAPACITY>,
        Notifier<'a>,
    ),
    Error,
> {
    let urc_subscription = urc_channel
        .subscribe()
        .map_err(|_| {
            Error::SubscriberOverflow(embassy_sync::pubsub::Error::MaximumSubscribersReached)
        })?;

    let ch = state::Runner::new(&mut state.ch);
    ch.with(|s| {
        s.settings = Settings {
            conn_info_polling: C::CONN_INFO_POLLING,
            http_polling: C::HTTP_POLLING,
            accept_timeout: C::ACCEPT_TIMEOUT,
            context_id: C::CONTEXT.id().unwrap_or(CONTEXT_ID_DEFAULT),
        }
    });
    let at = AtHandle(&state.at_handle);

    Ok((
        Control::new(ch, at, C::ECHO, C::CONTEXT),
        Sockets::new(ch, at),
        Runner::new(ch, &state.events, urc_subscription),
        Notifier::new(ch, &state.events),
    ))
}

/// Dotted quad form of `ip`, as the module expects it.
pub(crate) fn ip_str(ip: Ipv4Addr) -> String<16> {
    let mut out = String::new();
    let [a, b, c, d] = ip.octets();
    // 15 characters at most, always fits.
    let _ = write!(out, "{}.{}.{}.{}", a, b, c, d);
    out
}

/// Payload announced to the module with a `>` or `CONNECT` prompt, written
/// in one or more pieces. Only the piece completing the announced length
/// waits for the final result code.
pub(crate) struct Egress<'a, AT: AtatClient> {
    at: &'a mut AT,
    remaining: usize,
}

impl<'a, AT: AtatClient> Egress<'a, AT> {
    pub(crate) fn new(at: &'a mut AT, length: usize) -> Self {
        Self {
            at,
            remaining: length,
        }
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<(), atat::Error> {
        let data = &data[..data.len().min(self.remaining)];
        for chunk in data.chunks(EGRESS_CHUNK_SIZE) {
            self.remaining -= chunk.len();
            if self.remaining != 0 {
                self.at.send(&WriteChunk(chunk)).await?;
            } else {
                self.at
                    .send(&WriteData {
                        data: serde_at::ser::Bytes(chunk),
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

/// Write all of `data` after a prompt.
pub(crate) async fn write_payload<AT: AtatClient>(
    at: &mut AT,
    data: &[u8],
) -> Result<(), atat::Error> {
    Egress::new(at, data.len()).write(data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockAtClient;
    use embassy_futures::block_on;

    #[test]
    fn dotted_quad() {
        assert_eq!(ip_str(Ipv4Addr::new(255, 255, 255, 255)).as_str(), "255.255.255.255");
        assert_eq!(ip_str(Ipv4Addr::UNSPECIFIED).as_str(), "0.0.0.0");
    }

    #[test]
    fn payload_is_split_into_egress_chunks() {
        let mut at = MockAtClient::new();
        let log = at.log();
        let data = [b'x'; 2 * EGRESS_CHUNK_SIZE + 10];
        block_on(write_payload(&mut at, &data)).unwrap();

        let written = log.borrow().commands();
        assert_eq!(
            written.iter().map(|c| c.len()).collect::<std::vec::Vec<_>>(),
            [EGRESS_CHUNK_SIZE, EGRESS_CHUNK_SIZE, 10]
        );
        let log = log.borrow();
        assert_eq!(log.awaited(), [false, false, true]);
    }
}
