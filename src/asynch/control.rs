use atat::asynch::AtatClient;
use embassy_time::{with_timeout, Duration, Timer};
use no_std_net::{IpAddr, Ipv4Addr};

use super::event::EventCallback;
use super::{ip_str, state, AtHandle};
use crate::command::general::types::{EchoOn, SleepMode};
use crate::command::general::{GetPinStatus, GetRevision, GetSignalQuality, SetEcho, SetSleep};
use crate::command::ip_transport_layer::{GetDnsServers, Ping, SetDnsServers};
use crate::command::psn::responses::ContextParameters;
use crate::command::psn::types::ContextType;
use crate::command::psn::{
    ActivateContext, DeactivateContext, GetContext, GetPdpAddress, SetContext,
};
use crate::command::AT as AtCheck;
use crate::config::{Apn, ContextConfig};
use crate::error::Error;
use crate::flags;
use crate::module_timing::{
    pdp_time, boot_poll_interval, ready_time, response_time, signal_poll_interval, signal_time,
};
use crate::options::{Interface, ModuleOption, OptionId};
use crate::socket::{PdpHandle, PdpState, SocketError};

/// Driver API version.
pub const API_VERSION: u16 = 0x0100;
/// Driver implementation version.
pub const DRIVER_VERSION: u16 = 0x0100;

/// Reply timeout of a ping, in seconds.
const PING_TIMEOUT_S: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    Off,
    /// Module sleeps while the UART is idle
    Low,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    pub api: u16,
    pub driver: u16,
}

/// What the driver supports beyond the socket calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    pub station: bool,
    pub access_point: bool,
    pub station_ap: bool,
    pub wps_station: bool,
    pub wps_ap: bool,
    pub event_ap_connect: bool,
    pub event_ap_disconnect: bool,
    pub event_eth_rx_frame: bool,
    pub bypass_mode: bool,
    pub ip: bool,
    pub ip6: bool,
    pub ping: bool,
}

pub struct Control<'d, AT: AtatClient> {
    pub(crate) ch: state::Runner<'d>,
    pub(crate) at: AtHandle<'d, AT>,
    echo: bool,
    context: ContextConfig<'static>,
}

impl<'d, AT: AtatClient> Control<'d, AT> {
    pub(crate) fn new(
        ch: state::Runner<'d>,
        at: AtHandle<'d, AT>,
        echo: bool,
        context: ContextConfig<'static>,
    ) -> Self {
        Self {
            ch,
            at,
            echo,
            context,
        }
    }

    pub fn version(&self) -> Version {
        Version {
            api: API_VERSION,
            driver: DRIVER_VERSION,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            station: false,
            access_point: false,
            station_ap: false,
            wps_station: false,
            wps_ap: false,
            event_ap_connect: true,
            event_ap_disconnect: true,
            event_eth_rx_frame: false,
            bypass_mode: false,
            ip: true,
            ip6: false,
            ping: true,
        }
    }

    /// Register `callback` for upper layer events. Registries are reset the
    /// first time only, calling this again just replaces the callback.
    pub fn initialize(&self, callback: Option<EventCallback>) -> Result<(), Error> {
        self.ch.with(|s| {
            if !s.initialized {
                s.reset_registries();
                s.flags.clear(u32::MAX);
                s.initialized = true;
                info!("Driver initialized");
            }
            s.callback = callback;
        });
        Ok(())
    }

    pub fn uninitialize(&self) -> Result<(), Error> {
        self.ch.with(|s| {
            s.reset_registries();
            s.flags.clear(u32::MAX);
            s.callback = None;
            s.initialized = false;
            s.powered = false;
            s.station_connected = false;
            s.got_ip = false;
        });
        info!("Driver uninitialized");
        Ok(())
    }

    pub async fn power_control(&self, state: PowerState) -> Result<(), Error> {
        match state {
            PowerState::Off => self.ch.with(|s| {
                if !s.initialized {
                    return Err(Error::Uninitialized);
                }
                s.powered = false;
                s.reset_registries();
                info!("Powered off");
                Ok(())
            }),
            PowerState::Low => {
                self.at
                    .send(&SetSleep {
                        mode: SleepMode::Auto,
                    })
                    .await?;
                Ok(())
            }
            PowerState::Full => self.power_up().await,
        }
    }

    async fn power_up(&self) -> Result<(), Error> {
        let (initialized, powered) = self.ch.with(|s| (s.initialized, s.powered));
        if !initialized {
            return Err(Error::Uninitialized);
        }
        if powered {
            return Ok(());
        }

        let mut at = self.at.lock().await;

        // `RDY` may have been missed if the module was already running.
        self.ch.wait_flags(flags::READY, Some(ready_time())).await.ok();

        with_timeout(ready_time(), async {
            while at.send(&AtCheck).await.is_err() {
                Timer::after(boot_poll_interval()).await;
            }
        })
        .await?;

        if !at.send(&GetPinStatus).await?.is_ready() {
            warn!("SIM not ready");
            return Err(Error::Unspecified);
        }

        with_timeout(signal_time(), async {
            loop {
                match at.send(&GetSignalQuality).await {
                    Ok(quality) if quality.is_known() => {
                        debug!("Signal rssi {}", quality.rssi);
                        break;
                    }
                    _ => Timer::after(signal_poll_interval()).await,
                }
            }
        })
        .await?;

        at.send(&SetSleep {
            mode: SleepMode::Disabled,
        })
        .await?;
        at.send(&SetEcho {
            enabled: if self.echo { EchoOn::On } else { EchoOn::Off },
        })
        .await?;

        self.ch.with(|s| {
            s.powered = true;
            s.conn_ids.reset();
        });
        info!("Powered up");
        Ok(())
    }

    /// Firmware revision, truncated to `out`. Returns the bytes written.
    pub async fn module_info(&self, out: &mut [u8]) -> Result<usize, Error> {
        if out.is_empty() {
            return Err(Error::Parameter);
        }
        let revision = self.at.send(&GetRevision).await?.revision;
        let n = revision.len().min(out.len());
        out[..n].copy_from_slice(&revision.as_bytes()[..n]);
        Ok(n)
    }

    pub async fn set_option(
        &self,
        interface: Interface,
        option: ModuleOption,
    ) -> Result<(), Error> {
        match option {
            ModuleOption::Dns1(ip) | ModuleOption::Dns2(ip) => {
                let context_id = self.ch.with(|s| s.settings.context_id);
                let mut at = self.at.lock().await;
                let current = at.send(&GetDnsServers { context_id }).await?;
                let new = ip_str(ip);
                let (primary, secondary) = match option {
                    ModuleOption::Dns1(_) => (new.as_str(), current.secondary.as_str()),
                    _ => (current.primary.as_str(), new.as_str()),
                };
                at.send(&SetDnsServers {
                    context_id,
                    primary,
                    secondary,
                })
                .await?;
                Ok(())
            }
            _ => self.ch.with(|s| s.options.set(interface, option)),
        }
    }

    pub async fn get_option(
        &self,
        interface: Interface,
        id: OptionId,
    ) -> Result<ModuleOption, Error> {
        match id {
            OptionId::Dns1 | OptionId::Dns2 => {
                let context_id = self.ch.with(|s| s.settings.context_id);
                let servers = self.at.send(&GetDnsServers { context_id }).await?;
                let text = match id {
                    OptionId::Dns1 => servers.primary,
                    _ => servers.secondary,
                };
                let ip: Ipv4Addr = text.parse().map_err(|_| Error::Unspecified)?;
                Ok(match id {
                    OptionId::Dns1 => ModuleOption::Dns1(ip),
                    _ => ModuleOption::Dns2(ip),
                })
            }
            _ => self.ch.with(|s| s.options.get(interface, id)),
        }
    }

    /// Network scans are a WiFi concept.
    pub fn scan(&self, capacity: usize) -> Result<usize, Error> {
        if capacity == 0 {
            return Err(Error::Parameter);
        }
        Err(Error::Unsupported)
    }

    pub fn net_info(&self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    pub fn is_connected(&self) -> bool {
        self.ch.with(|s| s.station_connected)
    }

    /// Packets dropped for lack of socket buffer space.
    pub fn dropped_packets(&self) -> u32 {
        self.ch.with(|s| s.dropped_packets)
    }

    /// Ping `ip` once. Returns the round trip time in ms.
    pub async fn ping(&self, ip: IpAddr) -> Result<u32, Error> {
        let IpAddr::V4(ip) = ip else {
            return Err(Error::Unsupported);
        };
        let host = ip_str(ip);

        // Replies carry nothing to match them with the request.
        let mut at = self.at.lock().await;
        let context_id = self.ch.with(|s| {
            s.ping = None;
            s.flags.clear(flags::PING);
            s.settings.context_id
        });
        at.send(&Ping {
            context_id,
            host: &host,
            timeout: PING_TIMEOUT_S,
            count: 1,
        })
        .await?;

        let wait = Duration::from_secs(PING_TIMEOUT_S as u64) + response_time();
        self.ch.wait_flags(flags::PING, Some(wait)).await?;
        match self.ch.with(|s| s.ping.take()) {
            Some((0, time_ms)) => Ok(time_ms),
            Some((result, _)) => {
                debug!("Ping failed: {}", result);
                Err(Error::Timeout)
            }
            None => Err(Error::Timeout),
        }
    }

    /// Write the PDP context configuration if it carries an APN or
    /// credentials, then read it back.
    pub async fn context(&self, config: &ContextConfig<'_>) -> Result<ContextParameters, Error> {
        let context_id = config.id().ok_or(Error::Parameter)?;
        let mut at = self.at.lock().await;

        if config.is_write() {
            let (apn, username, password) = match config.apn {
                Apn::None => ("", "", ""),
                Apn::Given {
                    name,
                    username,
                    password,
                } => (name, username.unwrap_or(""), password.unwrap_or("")),
            };
            at.send(&SetContext {
                context_id,
                context_type: config.context_type.unwrap_or(ContextType::Ipv4),
                apn,
                username,
                password,
                authentication: config.authentication,
            })
            .await?;
        }
        Ok(at.send(&GetContext { context_id }).await?)
    }

    /// Activate a PDP context, the configured default one for `None`, and
    /// bind a PDP socket to it.
    pub async fn activate(
        &self,
        config: Option<&ContextConfig<'_>>,
    ) -> Result<(PdpHandle, Ipv4Addr), Error> {
        let config = config.copied().unwrap_or(self.context);
        let context_id = config.id().ok_or(Error::Parameter)?;
        if config.is_write() {
            self.context(&config).await?;
        }

        let mut at = self.at.lock().await;
        with_timeout(pdp_time(), at.send(&ActivateContext { context_id })).await??;
        let address = at.send(&GetPdpAddress { context_id }).await?.address;
        drop(at);

        let ip: Ipv4Addr = address.parse().map_err(|_| Error::Unspecified)?;
        let context_type = config.context_type.unwrap_or(ContextType::Ipv4);
        let handle = self.ch.with(|s| -> Result<PdpHandle, Error> {
            let handle = s.pdp.bind(context_id, context_type, ip)?;
            s.station_connected = true;
            s.got_ip = true;
            Ok(handle)
        })?;
        info!("Context {} active", context_id);
        Ok((handle, ip))
    }

    pub async fn deactivate(&self, handle: PdpHandle) -> Result<(), Error> {
        let context_id = self.ch.with(|s| -> Result<u8, Error> {
            let pdp = s.pdp.get(handle)?;
            match pdp.state() {
                PdpState::Free => Err(Error::Socket(SocketError::InvalidSocket)),
                PdpState::Connected => Err(Error::Busy),
                _ => Ok(pdp.context_id()),
            }
        })?;

        with_timeout(pdp_time(), self.at.send(&DeactivateContext { context_id })).await??;
        self.ch.with(|s| {
            s.pdp.release(handle).ok();
            s.station_connected = false;
            s.got_ip = false;
        });
        info!("Context {} deactivated", context_id);
        Ok(())
    }

    /// Abandon running HTTP transfers so their callers return. `Busy` while
    /// a command still holds the channel.
    pub fn release(&self) -> Result<(), Error> {
        self.ch.with(|s| s.fail_transfers());
        if self.at.is_locked() {
            return Err(Error::Busy);
        }
        Ok(())
    }
}
