mod checkin;
mod connection_config;
mod device;
mod personnel;
mod result;
mod sync_error;
mod sync_run;
mod sync_state;
mod transaction;

pub use checkin::*;
pub use connection_config::*;
pub use device::*;
pub use personnel::*;
pub use result::*;
pub use sync_error::*;
pub use sync_run::*;
pub use sync_state::*;
pub use transaction::*;
