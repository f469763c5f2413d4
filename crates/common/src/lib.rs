pub mod domain;
pub mod http;
pub mod postgres;
pub mod telemetry;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use domain::*;
pub use postgres::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCheckinRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockConnectionConfigRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceClient;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockPersonnelDirectory;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSyncRunRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSyncStateRepository;
