mod aggregate;
mod filter;
mod group_by_tag;
mod group_by_time;

pub use aggregate::{AggKind, Aggregate};
pub use filter::Filter;
pub use group_by_tag::GroupByTag;
pub use group_by_time::GroupByTime;
