//! Shared domain types for meter statistics processing.
//!
//! Every stage of the ingest pipeline speaks in these types: parsers produce
//! [`domain::Dataset`]s of [`domain::Reading`]s, the reconciler produces a
//! [`domain::ReconciledSeries`] per [`domain::Channel`], and the emitter
//! renders [`domain::StatisticRecord`]s.

pub mod domain;
