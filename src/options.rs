//! Module option table for `Control::set_option` / `Control::get_option`.
//!
//! Most options are only cached by the driver. DNS servers are the
//! exception, they live in the module and are handled by `Control`.

use no_std_net::Ipv4Addr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interface {
    Station,
    AccessPoint,
}

/// Option identifiers, used for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OptionId {
    Bssid,
    TxPower,
    LpTimer,
    Dtim,
    Beacon,
    Mac,
    IpAddress,
    SubnetMask,
    Gateway,
    Dns1,
    Dns2,
    DhcpPoolBegin,
    DhcpPoolEnd,
    DhcpLeaseTime,
    Ipv6Global,
    Ipv6LinkLocal,
    Ipv6SubnetPrefixLen,
    Ipv6Gateway,
    Ipv6Dns1,
    Ipv6Dns2,
}

/// An option together with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOption {
    Bssid([u8; 6]),
    /// dBm
    TxPower(u8),
    /// Deep sleep time in seconds, `0` disables
    LpTimer(u32),
    Dtim(u32),
    /// Beacon interval in ms
    Beacon(u32),
    Mac([u8; 6]),
    IpAddress(Ipv4Addr),
    SubnetMask(Ipv4Addr),
    Gateway(Ipv4Addr),
    Dns1(Ipv4Addr),
    Dns2(Ipv4Addr),
    DhcpPoolBegin(Ipv4Addr),
    DhcpPoolEnd(Ipv4Addr),
    /// Seconds
    DhcpLeaseTime(u32),
    Ipv6Global([u8; 16]),
    Ipv6LinkLocal([u8; 16]),
    Ipv6SubnetPrefixLen(u32),
    Ipv6Gateway([u8; 16]),
    Ipv6Dns1([u8; 16]),
    Ipv6Dns2([u8; 16]),
}

impl ModuleOption {
    pub const fn id(&self) -> OptionId {
        match self {
            Self::Bssid(_) => OptionId::Bssid,
            Self::TxPower(_) => OptionId::TxPower,
            Self::LpTimer(_) => OptionId::LpTimer,
            Self::Dtim(_) => OptionId::Dtim,
            Self::Beacon(_) => OptionId::Beacon,
            Self::Mac(_) => OptionId::Mac,
            Self::IpAddress(_) => OptionId::IpAddress,
            Self::SubnetMask(_) => OptionId::SubnetMask,
            Self::Gateway(_) => OptionId::Gateway,
            Self::Dns1(_) => OptionId::Dns1,
            Self::Dns2(_) => OptionId::Dns2,
            Self::DhcpPoolBegin(_) => OptionId::DhcpPoolBegin,
            Self::DhcpPoolEnd(_) => OptionId::DhcpPoolEnd,
            Self::DhcpLeaseTime(_) => OptionId::DhcpLeaseTime,
            Self::Ipv6Global(_) => OptionId::Ipv6Global,
            Self::Ipv6LinkLocal(_) => OptionId::Ipv6LinkLocal,
            Self::Ipv6SubnetPrefixLen(_) => OptionId::Ipv6SubnetPrefixLen,
            Self::Ipv6Gateway(_) => OptionId::Ipv6Gateway,
            Self::Ipv6Dns1(_) => OptionId::Ipv6Dns1,
            Self::Ipv6Dns2(_) => OptionId::Ipv6Dns2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Addresses {
    ip: Ipv4Addr,
    mask: Ipv4Addr,
    gateway: Ipv4Addr,
}

impl Addresses {
    const fn new() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Driver side option values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsCache {
    bssid: [u8; 6],
    ap_mac: [u8; 6],
    tx_power: u8,
    lp_timer: u32,
    station: Addresses,
    access_point: Addresses,
}

impl Default for OptionsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionsCache {
    pub const fn new() -> Self {
        Self {
            bssid: [0; 6],
            ap_mac: [0; 6],
            tx_power: 0,
            lp_timer: 0,
            station: Addresses::new(),
            access_point: Addresses::new(),
        }
    }

    fn addresses(&mut self, interface: Interface) -> &mut Addresses {
        match interface {
            Interface::Station => &mut self.station,
            Interface::AccessPoint => &mut self.access_point,
        }
    }

    /// Store a cached option. DNS servers are not cached and are rejected
    /// with `Parameter`.
    pub fn set(&mut self, interface: Interface, option: ModuleOption) -> Result<(), Error> {
        use Interface::*;

        match (interface, option) {
            (Station, ModuleOption::Bssid(bssid)) => self.bssid = bssid,
            (Station, ModuleOption::LpTimer(secs)) => self.lp_timer = secs,
            (AccessPoint, ModuleOption::Mac(mac)) => self.ap_mac = mac,
            (_, ModuleOption::TxPower(dbm)) => self.tx_power = dbm,
            (_, ModuleOption::IpAddress(ip)) => self.addresses(interface).ip = ip,
            (_, ModuleOption::SubnetMask(mask)) => self.addresses(interface).mask = mask,
            (_, ModuleOption::Gateway(gw)) => self.addresses(interface).gateway = gw,
            (_, ModuleOption::Dns1(_) | ModuleOption::Dns2(_)) => return Err(Error::Parameter),
            _ => return Err(Error::Unsupported),
        }
        Ok(())
    }

    pub fn get(&mut self, interface: Interface, id: OptionId) -> Result<ModuleOption, Error> {
        use Interface::*;

        Ok(match (interface, id) {
            (Station, OptionId::Bssid) => ModuleOption::Bssid(self.bssid),
            (Station, OptionId::LpTimer) => ModuleOption::LpTimer(self.lp_timer),
            (AccessPoint, OptionId::Mac) => ModuleOption::Mac(self.ap_mac),
            (_, OptionId::TxPower) => ModuleOption::TxPower(self.tx_power),
            (_, OptionId::IpAddress) => ModuleOption::IpAddress(self.addresses(interface).ip),
            (_, OptionId::SubnetMask) => ModuleOption::SubnetMask(self.addresses(interface).mask),
            (_, OptionId::Gateway) => ModuleOption::Gateway(self.addresses(interface).gateway),
            (_, OptionId::Dns1 | OptionId::Dns2) => return Err(Error::Parameter),
            _ => return Err(Error::Unsupported),
        })
    }
}
