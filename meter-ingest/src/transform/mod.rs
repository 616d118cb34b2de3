//! Pure transformations from parsed datasets to emit-ready series.

pub mod aggregate;
pub mod reconcile;

pub use aggregate::ResolutionAggregator;
pub use reconcile::{Reconciler, Reconciliation, ReconciliationWarning};
