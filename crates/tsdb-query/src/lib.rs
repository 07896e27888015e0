//! Streaming operator-graph query pipeline: a `Node` chain built bottom-up
//! from a parsed reshape request, driven by a scan/metadata feed the
//! storage layer owns, and terminated by a caller-supplied `Cursor`.

mod builder;
mod cursor;
mod error;
mod node;
mod ops;
mod parse;
mod request;

pub use builder::build_chain;
pub use cursor::{Cursor, VecCursor};
pub use error::QueryParserError;
pub use node::{Node, Requirements, Terminal};
pub use ops::{AggKind, Aggregate, Filter, GroupByTag, GroupByTime};
pub use parse::{parse_predicate, parse_query};
pub use request::{GroupBySpec, OperatorSpec, OrderBy, Range, ReshapeRequest, Select};
