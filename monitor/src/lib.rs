//! Packet Loss Monitor Library
//!
//! Provides the prober, statistics aggregation and measurement loop used
//! by the `loss-monitor` binary.

pub mod collector;
pub mod config;
pub mod driver;
pub mod exporter;
pub mod prober;
pub mod types;

pub use collector::StatsAggregator;
pub use config::MonitorConfig;
pub use driver::{listen_for_interrupt, stop_channel, Driver, DriverState, StopHandle, StopSignal};
pub use exporter::{JsonExporter, ReportExporter, TextExporter};
pub use prober::{IcmpProber, Prober, TransportError};
pub use types::*;
