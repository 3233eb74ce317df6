pub mod config;
pub mod error;
pub mod roster;
pub mod timetable;

// Re-export commonly used types
pub use config::{Config, ListenerConfig, PeriodConfig, StorageConfig};
pub use error::{DomainError, InfraError, RollcallError};
pub use roster::{EntityId, Roster, RosterEntry};
pub use timetable::{Interval, IntervalRow, Timetable};
