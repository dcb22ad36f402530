//! Process bootstrap helpers shared by every role

pub mod config;

pub use config::load_config;
