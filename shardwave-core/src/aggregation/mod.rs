//! The fourteen aggregation kinds and their distributed merge (C4), §4.4.

mod merge;
mod types;

pub use merge::merge_aggregations;
pub use types::{
    AggregationPartial, AggregationResult, DateBucket, NumericBucket, RangeBucket, TermsBucket,
};
