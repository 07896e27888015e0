use std::rc::Rc;

use regex::Regex;

use crate::canon;

/// The minimum query-time matching vocabulary named in spec.md §9:
/// `metric starts-with`, `tag equals`, `tag regex`, plus a `Custom` escape
/// hatch for anything the JSON grammar grows later.
#[derive(Clone)]
pub enum Predicate {
    MetricStartsWith(String),
    TagEquals { key: String, value: String },
    TagRegex { key: String, pattern: Regex },
    Custom(Rc<dyn Fn(&str) -> bool>),
}

impl Predicate {
    pub fn matches(&self, canonical_name: &str) -> bool {
        match self {
            Predicate::MetricStartsWith(prefix) => canonical_name
                .split_whitespace()
                .next()
                .is_some_and(|metric| metric.starts_with(prefix.as_str())),
            Predicate::TagEquals { key, value } => {
                let Ok(parsed) = canon::parse_single(canonical_name) else {
                    return false;
                };
                parsed.tags.iter().any(|(k, v)| k == key && v == value)
            }
            Predicate::TagRegex { key, pattern } => {
                let Ok(parsed) = canon::parse_single(canonical_name) else {
                    return false;
                };
                parsed
                    .tags
                    .iter()
                    .any(|(k, v)| k == key && pattern.is_match(v))
            }
            Predicate::Custom(f) => f(canonical_name),
        }
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::MetricStartsWith(p) => write!(f, "MetricStartsWith({p:?})"),
            Predicate::TagEquals { key, value } => write!(f, "TagEquals({key:?}={value:?})"),
            Predicate::TagRegex { key, pattern } => {
                write!(f, "TagRegex({key:?}~{:?})", pattern.as_str())
            }
            Predicate::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
