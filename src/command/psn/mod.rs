//! ### 2.3 - PDP context Commands
pub mod responses;
pub mod types;

use atat::atat_derive::AtatCmd;
use responses::*;
use types::*;

use super::NoResponse;

/// 2.3.2 Configure parameters of a TCP/IP context +QICSGP
#[derive(Clone, AtatCmd)]
#[at_cmd("+QICSGP", NoResponse)]
pub struct SetContext<'a> {
    #[at_arg(position = 0)]
    pub context_id: u8,
    #[at_arg(position = 1)]
    pub context_type: ContextType,
    #[at_arg(position = 2, len = 64)]
    pub apn: &'a str,
    #[at_arg(position = 3, len = 64)]
    pub username: &'a str,
    #[at_arg(position = 4, len = 64)]
    pub password: &'a str,
    #[at_arg(position = 5)]
    pub authentication: AuthMethod,
}

/// 2.3.2 Query parameters of a TCP/IP context +QICSGP
#[derive(Clone, AtatCmd)]
#[at_cmd("+QICSGP", ContextParameters)]
pub struct GetContext {
    #[at_arg(position = 0)]
    pub context_id: u8,
}

/// 2.3.3 Activate a PDP context +QIACT
///
/// Depending on the network this may take up to 150 seconds.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIACT", NoResponse, timeout_ms = 150000)]
pub struct ActivateContext {
    #[at_arg(position = 0)]
    pub context_id: u8,
}

/// 2.3.4 Deactivate a PDP context +QIDEACT
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDEACT", NoResponse, timeout_ms = 40000)]
pub struct DeactivateContext {
    #[at_arg(position = 0)]
    pub context_id: u8,
}

/// 10.2 Show PDP address +CGPADDR
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGPADDR", PdpAddress)]
pub struct GetPdpAddress {
    #[at_arg(position = 0)]
    pub context_id: u8,
}
