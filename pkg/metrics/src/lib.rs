pub mod recorder;
pub mod registry;

pub use recorder::{ClaimRecorder, PoolRecorder};
pub use registry::MetricsRegistry;
