//! Probe dispatch and per-service / fan-out orchestration

pub mod dispatcher;
pub mod probe;

pub use dispatcher::{AggregateResult, Dispatcher, DispatcherConfig, ProbeResult, FAILURE_STATUS};
pub use probe::{HttpProber, ProbeResponse, ProbeSettings, Prober, RAW_BODY_KEY};
