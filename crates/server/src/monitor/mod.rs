//! Result aggregation: daily records, the incident engine, consensus and
//! uptime fusion.

pub mod cache;
pub mod engine;
pub mod records;
pub mod uptime;

pub use cache::QueryCache;
pub use engine::{MonitorEngine, TargetStatus, MIN_AGENTS_FOR_DOWNTIME};
pub use records::{DailyRecord, Incident, ResponseTimeBucket, ResultsTree};
