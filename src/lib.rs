pub mod config;
pub mod ethereum;
