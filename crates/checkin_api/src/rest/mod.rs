pub mod connection_handler;
pub mod response;
pub mod server;
pub mod sync_handler;

pub use connection_handler::*;
pub use response::*;
pub use server::*;
pub use sync_handler::*;
