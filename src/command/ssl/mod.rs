//! ### SSL Commands
pub mod types;

use atat::atat_derive::AtatCmd;
use atat::serde_at;

use super::NoResponse;

/// Configure a numeric SSL context parameter +QSSLCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QSSLCFG", NoResponse)]
pub struct SetSslNumber<'a> {
    #[at_arg(position = 0, len = 32)]
    pub name: &'a str,
    #[at_arg(position = 1)]
    pub ssl_context_id: u8,
    #[at_arg(position = 2)]
    pub value: u32,
}

/// Configure a file path SSL context parameter +QSSLCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QSSLCFG", NoResponse)]
pub struct SetSslText<'a> {
    #[at_arg(position = 0, len = 32)]
    pub name: &'a str,
    #[at_arg(position = 1)]
    pub ssl_context_id: u8,
    #[at_arg(position = 2, len = 80)]
    pub value: &'a str,
}

/// Configure an unquoted SSL context parameter, such as the hex cipher
/// suite `0xFFFF` +QSSLCFG
#[derive(Clone, AtatCmd)]
#[at_cmd("+QSSLCFG", NoResponse)]
pub struct SetSslRaw<'a> {
    #[at_arg(position = 0, len = 32)]
    pub name: &'a str,
    #[at_arg(position = 1)]
    pub ssl_context_id: u8,
    #[at_arg(position = 2, len = 8)]
    pub value: serde_at::ser::Bytes<'a>,
}
