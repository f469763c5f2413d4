mod logging;
mod otel_tracing;

pub use logging::*;
pub use otel_tracing::*;
