mod api_result;
mod checkin_ingestor;
mod dedup_store;
mod identity_resolver;
mod sync_engine;
mod sync_engine_config;
mod sync_scheduler;
mod sync_service;

pub use api_result::*;
pub use checkin_ingestor::*;
pub use dedup_store::*;
pub use identity_resolver::*;
pub use sync_engine::*;
pub use sync_engine_config::*;
pub use sync_scheduler::*;
pub use sync_service::*;
