// Domain models: raw counters, derived rates, merged summaries.

mod counters;
mod rates;
mod summary;

pub use counters::{CounterSnapshot, DeviceCounters, HostCounters};
pub use rates::{DeviceRates, RateSample};
pub use summary::{DeviceSummary, HostSummary, IoSource, bytes2human};
