//! Turns utility meter exports into monotonic cumulative energy statistics.
//!
//! Stages: [`sources`] detects and parses each file, [`transform`]
//! reconciles and aggregates per channel, [`sinks`] emits and renders.
//! [`pipeline::Pipeline`] chains them.

pub mod config;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Pipeline, PipelineError, StatisticsBatch};
