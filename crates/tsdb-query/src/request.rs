use tsdb_proto::ParamId;

use crate::ops::AggKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    /// Merge all selected series by timestamp.
    Time,
    /// Emit each series contiguously.
    Series,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    /// Scan direction per spec.md §4.5: forward if `begin <= end`.
    pub fn forward(&self) -> bool {
        self.begin <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub ids: Vec<ParamId>,
    pub range: Range,
}

/// What the parser produces once a query document has been walked: the
/// shape of the scan/metadata pass plus ordering, independent of the
/// operator chain built on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapeRequest {
    pub select: Select,
    pub group_by: Option<GroupBySpec>,
    pub order_by: OrderBy,
    /// Present only for `suggest`/`search`-style metadata queries.
    pub metadata_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBySpec {
    Time { step: u64 },
    Tag { tags: Vec<String> },
}

/// One operator descriptor from the query's optional operator list,
/// materialized into a concrete node by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorSpec {
    /// Raw `where` predicate text (spec.md §6/§9 grammar: `metric:`/`tag:`
    /// as parsed by `parse_predicate`). The builder can't resolve series
    /// names itself, so it takes the caller-computed set of matching ids
    /// (`tsdb_storage::pipeline` resolves this via `NameRegistry`) rather
    /// than the predicate directly.
    Filter { predicate: String },
    GroupByTime { step: u64 },
    GroupByTag { tags: Vec<String> },
    Aggregate { kind: AggKind },
}
