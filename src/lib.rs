#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

mod fmt;

pub mod asynch;

mod config;
mod connection;

#[cfg(test)]
mod test_helpers;

pub use atat;

pub mod command;
pub mod error;
pub use config::{ModemConfig, ResetCause, Transport};
pub use connection::{DnsServers, PppConnection};
