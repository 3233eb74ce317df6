//! rollcall_period
//! Schedule-driven period state machine and the snapshot it triggers.

pub mod monitor;
pub mod snapshot;
pub mod state;

pub use monitor::{Clock, ManualClock, PeriodMonitor, PollOutcome, SystemClock};
pub use snapshot::{reconcile, SnapshotError, SnapshotGenerator, SnapshotOutcome};
pub use state::{classify, locate, plan, plan_slot, Period, Slot, Transition};
