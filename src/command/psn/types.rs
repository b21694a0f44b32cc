//! Argument and parameter types used by PDP context Commands and Responses
use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum ContextType {
    Ipv4 = 1,
    Ipv6 = 2,
    Ipv4v6 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum AuthMethod {
    None = 0,
    Pap = 1,
    Chap = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum ContextState {
    Deactivated = 0,
    Activated = 1,
}
