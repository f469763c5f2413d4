pub mod domain;
pub mod sync_worker;

pub use domain::*;
pub use sync_worker::*;
