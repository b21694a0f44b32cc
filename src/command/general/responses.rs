//! Responses for General Commands
use atat::atat_derive::AtatResp;
use heapless::String;

/// 2.6 Software release revision
#[derive(Debug, Clone, AtatResp)]
pub struct Revision {
    #[at_arg(position = 0)]
    pub revision: String<64>,
}

/// 5.3 SIM status, `READY` when no password is pending
#[derive(Debug, Clone, AtatResp)]
pub struct PinStatus {
    #[at_arg(position = 0)]
    pub code: String<16>,
}

impl PinStatus {
    pub fn is_ready(&self) -> bool {
        self.code.as_str() == "READY"
    }
}

/// 6.3 Signal quality
#[derive(Debug, Clone, AtatResp)]
pub struct SignalQuality {
    /// 0..=31, 99 when not known or not detectable
    #[at_arg(position = 0)]
    pub rssi: u8,
    #[at_arg(position = 1)]
    pub ber: u8,
}

impl SignalQuality {
    pub fn is_known(&self) -> bool {
        self.rssi != 99
    }
}
