use serde::Deserialize;
use tsdb_names::Predicate;

use crate::error::QueryParserError;
use crate::ops::AggKind;
use crate::request::{GroupBySpec, OperatorSpec, OrderBy, Range, ReshapeRequest, Select};

/// Minimum viable JSON grammar (spec.md §4/§9): a `select` of series ids
/// over a `range`, an optional `where` predicate (same `metric:`/`tag:`
/// grammar as `parse_predicate`), an optional `group-by`, an optional
/// `order-by`, and an optional trailing `operators` list layered on top of
/// whatever `where`/`group-by` already imply. Unknown top-level keys are
/// rejected rather than silently ignored.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQuery {
    select: RawSelect,
    range: RawRange,
    #[serde(default, rename = "where")]
    where_: Option<String>,
    #[serde(default, rename = "group-by")]
    group_by: Option<RawGroupBy>,
    #[serde(default, rename = "order-by")]
    order_by: Option<String>,
    #[serde(default)]
    operators: Vec<RawOperator>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSelect {
    ids: Vec<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRange {
    from: u64,
    to: u64,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
enum RawGroupBy {
    Time { step: u64 },
    Tag { tags: Vec<String> },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
enum RawOperator {
    GroupByTime { step: u64 },
    GroupByTag { tags: Vec<String> },
    Aggregate { op: String },
}

/// Parses a full reshape query document into the request shape plus the
/// operator chain the builder will turn into nodes. `group-by`, if present,
/// always contributes the leading operator; `operators` appends on top of
/// it (e.g. an `aggregate` riding a `group-by-time` window).
pub fn parse_query(text: &str) -> Result<(ReshapeRequest, Vec<OperatorSpec>), QueryParserError> {
    let raw: RawQuery = serde_json::from_str(text)?;

    let order_by = match raw.order_by.as_deref() {
        None | Some("time") => OrderBy::Time,
        Some("series") => OrderBy::Series,
        Some(other) => return Err(QueryParserError::UnknownOrderBy(other.to_string())),
    };

    let group_by = raw.group_by.map(|g| match g {
        RawGroupBy::Time { step } => GroupBySpec::Time { step },
        RawGroupBy::Tag { tags } => GroupBySpec::Tag { tags },
    });

    // Validate the predicate grammar eagerly so a malformed `where` surfaces
    // at parse time rather than when the pipeline tries to resolve it.
    if let Some(predicate) = &raw.where_ {
        parse_predicate(predicate)?;
    }

    let mut operators = Vec::new();
    if let Some(predicate) = &raw.where_ {
        operators.push(OperatorSpec::Filter {
            predicate: predicate.clone(),
        });
    }
    if let Some(gb) = &group_by {
        operators.push(match gb {
            GroupBySpec::Time { step } => OperatorSpec::GroupByTime { step: *step },
            GroupBySpec::Tag { tags } => OperatorSpec::GroupByTag {
                tags: tags.clone(),
            },
        });
    }
    for op in raw.operators {
        operators.push(match op {
            RawOperator::GroupByTime { step } => OperatorSpec::GroupByTime { step },
            RawOperator::GroupByTag { tags } => OperatorSpec::GroupByTag { tags },
            RawOperator::Aggregate { op } => OperatorSpec::Aggregate {
                kind: parse_agg_kind(&op)?,
            },
        });
    }

    let request = ReshapeRequest {
        select: Select {
            ids: raw.select.ids,
            range: Range {
                begin: raw.range.from,
                end: raw.range.to,
            },
        },
        group_by,
        order_by,
        metadata_filter: raw.where_,
    };

    Ok((request, operators))
}

fn parse_agg_kind(op: &str) -> Result<AggKind, QueryParserError> {
    match op {
        "sum" => Ok(AggKind::Sum),
        "mean" => Ok(AggKind::Mean),
        "derivative" => Ok(AggKind::Derivative),
        other => Err(QueryParserError::UnknownOperator(other.to_string())),
    }
}

/// Tiny grammar for `suggest`/`search` metadata calls, which take a single
/// predicate string rather than a full reshape document:
/// `metric:<prefix>`, `tag:<key>=<value>`, `tag:<key>~<regex>`.
pub fn parse_predicate(text: &str) -> Result<Predicate, QueryParserError> {
    let text = text.trim();
    if let Some(prefix) = text.strip_prefix("metric:") {
        return Ok(Predicate::MetricStartsWith(prefix.to_string()));
    }
    if let Some(rest) = text.strip_prefix("tag:") {
        if let Some((key, value)) = rest.split_once('=') {
            return Ok(Predicate::TagEquals {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        if let Some((key, pattern)) = rest.split_once('~') {
            let regex = regex::Regex::new(pattern).map_err(|e| QueryParserError::Malformed {
                line: 0,
                column: 0,
                message: e.to_string(),
            })?;
            return Ok(Predicate::TagRegex {
                key: key.to_string(),
                pattern: regex,
            });
        }
    }
    Err(QueryParserError::Malformed {
        line: 0,
        column: 0,
        message: format!("unrecognized predicate '{text}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_query() {
        let text = r#"{"select":{"ids":[1,2]},"range":{"from":0,"to":100}}"#;
        let (req, ops) = parse_query(text).unwrap();
        assert_eq!(req.select.ids, vec![1, 2]);
        assert_eq!(req.order_by, OrderBy::Time);
        assert!(ops.is_empty());
    }

    #[test]
    fn group_by_time_becomes_leading_operator() {
        let text = r#"{
            "select":{"ids":[1]},
            "range":{"from":0,"to":100},
            "group-by":{"kind":"time","step":10},
            "operators":[{"kind":"aggregate","op":"sum"}]
        }"#;
        let (_, ops) = parse_query(text).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], OperatorSpec::GroupByTime { step: 10 }));
        assert!(matches!(ops[1], OperatorSpec::Aggregate { kind: AggKind::Sum }));
    }

    #[test]
    fn where_clause_becomes_leading_filter_operator() {
        let text = r#"{
            "select":{"ids":[1]},
            "range":{"from":0,"to":100},
            "where":"tag:host=a",
            "group-by":{"kind":"time","step":10}
        }"#;
        let (req, ops) = parse_query(text).unwrap();
        assert_eq!(req.metadata_filter.as_deref(), Some("tag:host=a"));
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            &ops[0],
            OperatorSpec::Filter { predicate } if predicate == "tag:host=a"
        ));
        assert!(matches!(ops[1], OperatorSpec::GroupByTime { step: 10 }));
    }

    #[test]
    fn malformed_where_clause_is_rejected() {
        let text = r#"{"select":{"ids":[1]},"range":{"from":0,"to":1},"where":"nonsense"}"#;
        assert!(matches!(
            parse_query(text),
            Err(QueryParserError::Malformed { .. })
        ));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let text = r#"{"select":{"ids":[1]},"range":{"from":0,"to":1},"bogus":true}"#;
        assert!(parse_query(text).is_err());
    }

    #[test]
    fn unknown_order_by_is_rejected() {
        let text = r#"{"select":{"ids":[1]},"range":{"from":0,"to":1},"order-by":"sideways"}"#;
        assert!(matches!(
            parse_query(text),
            Err(QueryParserError::UnknownOrderBy(_))
        ));
    }

    #[test]
    fn unknown_aggregate_op_is_rejected() {
        let text = r#"{
            "select":{"ids":[1]},"range":{"from":0,"to":1},
            "operators":[{"kind":"aggregate","op":"median"}]
        }"#;
        assert!(matches!(
            parse_query(text),
            Err(QueryParserError::UnknownOperator(_))
        ));
    }

    #[test]
    fn predicate_grammar() {
        assert!(matches!(
            parse_predicate("metric:cpu").unwrap(),
            Predicate::MetricStartsWith(p) if p == "cpu"
        ));
        assert!(matches!(
            parse_predicate("tag:host=a").unwrap(),
            Predicate::TagEquals { .. }
        ));
        assert!(matches!(
            parse_predicate("tag:host~^a[0-9]+$").unwrap(),
            Predicate::TagRegex { .. }
        ));
        assert!(parse_predicate("nonsense").is_err());
    }
}
