//! Vigil Core - blind collection and time-locked discourse analysis
//!
//! Vigil collects time-series discourse data (tasks and comments) from a
//! collaboration platform, withholds it from analysis until a pre-committed
//! unlock time, and then runs a fixed, pre-registered set of semantic
//! metrics over the accumulated history. The point is eliminating
//! observer-effect contamination: nothing reads semantic content before the
//! seal date, and the metrics computed afterward are exactly those declared
//! before collection began.
//!
//! # Architecture
//!
//! 1. **Snapshot Store** (`store`): append-only, hash-chained, content-addressed log
//! 2. **Seal Manager** (`seal`): time-lock state machine with integrity verification
//! 3. **Protocol Registry** (`protocol`): freezable pre-commitment of the metric set
//! 4. **Collector** (`collector` + `source`): periodic single-writer data pulls
//! 5. **Structural Metrics** (`metrics`): count-only talk-to-code ratios, live anytime
//! 6. **Analysis Pipeline** (`analysis`): the five semantic metrics, post-unlock only
//!
//! # Design Principles
//!
//! 1. **Defense in depth**: the seal gate is checked on every content read path,
//!    not at a single choke point
//! 2. **Append-only everywhere**: snapshots, the seal record, and analysis runs
//!    are never mutated in place
//! 3. **Typed boundaries**: loosely-typed API responses validate into typed
//!    records or typed soft failures, never unchecked field access

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod analysis;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod seal;
pub mod source;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use analysis::run_log::{AnalysisRun, MetricResult, RunLog};
pub use analysis::AnalysisPipeline;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{CollectionReport, Collector, SoftFailure};
pub use config::VigilConfig;
pub use error::{Result, VigilError};
pub use metrics::{Category, StructuralReport};
pub use protocol::{MetricKind, ProtocolDefinition, ProtocolRegistry};
pub use seal::{SealGate, SealManager, SealRecord, SealState, UnlockOutcome};
pub use source::{ClawBoardClient, DiscourseSource};
pub use store::{Snapshot, SnapshotStore};
pub use types::{Blake3Hash, Comment, Task, TaskActivity, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
