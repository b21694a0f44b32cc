//! Argument and parameter types used by General Commands and Responses
use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum EchoOn {
    Off = 0,
    On = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum SleepMode {
    /// Sleep disabled
    Disabled = 0,
    /// Sleep controlled by the DTR line
    Dtr = 1,
    /// Module enters sleep automatically when idle
    Auto = 2,
}
