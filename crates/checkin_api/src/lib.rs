pub mod checkin_api;
pub mod rest;

pub use checkin_api::*;
pub use rest::*;
