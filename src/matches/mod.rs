//! Started matches and their reconciliation
//!
//! `MatchRegistry` owns every match handed to the match service, and
//! `TimeoutWatchdog` periodically polls them to evict abandoned ones.

pub mod instance;
pub mod registry;
pub mod watchdog;

pub use instance::{AbandonReason, Match};
pub use registry::{MatchRegistry, StartedMatch};
pub use watchdog::{SweepReport, TimeoutWatchdog, WatchdogConfig};
