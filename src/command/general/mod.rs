//! ### 2 - General Commands
pub mod responses;
pub mod types;

use atat::atat_derive::AtatCmd;
use responses::*;
use types::*;

use super::NoResponse;

/// 2.6 Request TA revision identification of software release +GMR
#[derive(Clone, AtatCmd)]
#[at_cmd("+GMR", Revision)]
pub struct GetRevision;

/// 2.21 Set command echo mode E
///
/// Controls whether the module echoes characters received from the host
/// during command state.
#[derive(Clone, AtatCmd)]
#[at_cmd("E", NoResponse, value_sep = false)]
pub struct SetEcho {
    #[at_arg(position = 0)]
    pub enabled: EchoOn,
}

/// 5.3 Enter PIN +CPIN
///
/// Read command reports whether the SIM card is ready or which password is
/// still required.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CPIN?", PinStatus, timeout_ms = 5000)]
pub struct GetPinStatus;

/// 6.3 Signal quality report +CSQ
#[derive(Clone, AtatCmd)]
#[at_cmd("+CSQ", SignalQuality, timeout_ms = 300)]
pub struct GetSignalQuality;

/// 4.6 Configure sleep mode +QSCLK
#[derive(Clone, AtatCmd)]
#[at_cmd("+QSCLK", NoResponse)]
pub struct SetSleep {
    #[at_arg(position = 0)]
    pub mode: SleepMode,
}
