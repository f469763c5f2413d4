pub mod biotime_client;
pub mod config;
mod parse;

pub use biotime_client::*;
pub use config::*;
