//! Fault-injection and resource-pressure primitives.
//!
//! Buffers here commit real pages, the default report cache never evicts,
//! and latency arrives on a call-count schedule. The deploy gate can refuse
//! to let the process come up at all.

pub mod buffer;
pub mod cancel;
pub mod deploy_gate;
pub mod latency;
pub mod leak_cache;
pub mod memory;

pub use buffer::{BYTES_PER_MB, PAGE_STRIDE, ResourceBuffer, allocate, churn, touch};
pub use cancel::{CancellationToken, SleepOutcome};
pub use deploy_gate::{
    DeployGate, DeployGateError, EnvFlagMarker, FAILURE_DIAGNOSTIC, FileMarker, GateVerdict,
    MarkerProbe,
};
pub use latency::{
    DelaySource, DelayWindow, InjectedDelay, LatencyInjector, LatencyPolicy, ModularBand,
    PlannedDelay, ProbabilisticDelay,
};
pub use leak_cache::{
    BoundedReportCache, CacheStats, CachedReport, ReportCache, ReportMetadata, ReportSummary,
    UnboundedReportCache,
};
pub use memory::MemorySnapshot;
