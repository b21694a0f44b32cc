#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod asynch;
pub mod command;
pub mod config;
pub mod error;
pub mod flags;
pub mod http;
pub mod options;
pub mod socket;
mod module_timing;

#[cfg(test)]
mod test_helpers;
