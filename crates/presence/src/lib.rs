//! rollcall_presence
//! Live location state shared by ingestion sessions and the period monitor.

pub mod store;

pub use store::{LiveRecord, Observation, PresenceSnapshot, PresenceStore};
