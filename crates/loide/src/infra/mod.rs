//! Infrastructure adapters for config, logging, persistence, and transports.

pub mod config;
pub mod logging;
pub mod loopback;
pub mod socket;
pub mod storage;
