//! Configuration, logging and bootstrap shared by the gateway and service roles

pub mod bootstrap;
pub mod config;
pub mod logging;

pub use config::Config;
