//! Process-wide series-name registry: global authoritative dictionary plus
//! a per-session local cache, canonicalization of tagged names, joined-name
//! expansion, query-time predicates, and the scoped matcher-override stack
//! used by group-by-tag.

mod canon;
mod dictionary;
mod error;
mod matcher;
mod predicate;
mod registry;

pub use canon::{parse_joined, parse_single, ParsedName};
pub use dictionary::GlobalDictionary;
pub use error::NamesError;
pub use matcher::{Matcher, MatcherScope};
pub use predicate::Predicate;
pub use registry::{NameRegistry, ResolveOutcome};
