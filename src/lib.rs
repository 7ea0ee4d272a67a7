//! Bounded, persisted battery-level history shared between a reporting
//! device and an aggregating device.
//!
//! - [`history`]: ring buffer, recording policy, persistence, relay, queries
//! - [`rpc`]: protobuf request handling and relay notifications
//! - [`config`]: TOML configuration

pub mod config;
pub mod history;
pub mod rpc;

pub use config::Config;
