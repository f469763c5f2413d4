mod checkin_repository;
mod client;
mod config;
mod connection_config_repository;
mod personnel_directory;
mod sync_run_repository;
mod sync_state_repository;

pub use checkin_repository::*;
pub use client::*;
pub use config::*;
pub use connection_config_repository::*;
pub use personnel_directory::*;
pub use sync_run_repository::*;
pub use sync_state_repository::*;
