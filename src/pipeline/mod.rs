//! The watch pipeline.
//!
//! - `diff`: Detect new and changed listings against the snapshot
//! - `enhance`, `stations`, `commute`: Attach derived features to the delta
//! - `filter`: Decide which enhanced listings are hits
//! - `timer`, `watch`: Run cycles on an interval until shutdown

pub mod commute;
pub mod diff;
pub mod enhance;
pub mod filter;
pub mod stations;
pub mod timer;
pub mod watch;

pub use commute::CommuteTimeCalculator;
pub use diff::{Diff, DiffCalculator, DiffResult};
pub use enhance::{EnhanceReport, EnhancerPipeline, FeatureCalculator};
pub use filter::{ListingFilter, RuleFilter};
pub use stations::{NearestStationCalculator, StationIndex};
pub use timer::{CycleTimer, Shutdown, shutdown_channel, shutdown_requested};
pub use watch::{CycleReport, PreparedCycle, Watcher};
