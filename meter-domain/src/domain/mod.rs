mod channel;
mod dataset;
mod error;
mod format;
mod reading;
mod resolution;
mod series;
mod statistic;

pub use channel::Channel;
pub use dataset::{Dataset, DatasetMetadata, SkippedRow};
pub use error::DomainError;
pub use format::SourceFormat;
pub use reading::{Reading, ReadingKind};
pub use resolution::Resolution;
pub use series::{ReconciledSeries, Sample};
pub use statistic::StatisticRecord;
