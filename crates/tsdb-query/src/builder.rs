use std::collections::{HashMap, HashSet};

use tsdb_proto::ParamId;

use crate::error::QueryParserError;
use crate::node::{Node, Requirements};
use crate::ops::{AggKind, Aggregate, Filter, GroupByTag, GroupByTime};
use crate::request::OperatorSpec;

/// Validates that every `Aggregate` in the spec list is preceded by a
/// `GroupByTime`/`GroupByTag` operator (`Requirements::GROUP_BY_REQUIRED`),
/// then builds the `Box<dyn Node>` chain bottom-up: the terminal is the
/// root's innermost downstream, and each spec wraps it in reverse order so
/// the returned node is the first one samples are `put` into.
///
/// `tag_map` supplies the `source_id -> transient_id` rewrite a
/// `GroupByTag` spec needs; `filter_ids` supplies the set of ids a `Filter`
/// spec's `where` predicate matched. Both are built by the caller (the
/// storage layer, which has access to `NameRegistry::search`) and ignored
/// when no corresponding operator is present.
pub fn build_chain(
    specs: &[OperatorSpec],
    tag_map: HashMap<ParamId, ParamId>,
    filter_ids: HashSet<ParamId>,
    terminal: Box<dyn Node>,
) -> Result<Box<dyn Node>, QueryParserError> {
    validate_requirements(specs)?;

    let mut chain = terminal;
    for spec in specs.iter().rev() {
        chain = match spec {
            OperatorSpec::Filter { .. } => {
                let allowed = filter_ids.clone();
                Box::new(Filter::new(
                    Box::new(move |s| allowed.contains(&s.param_id)),
                    chain,
                ))
            }
            OperatorSpec::GroupByTime { step } => Box::new(GroupByTime::new(*step, chain)),
            OperatorSpec::GroupByTag { .. } => {
                Box::new(GroupByTag::new(tag_map.clone(), chain))
            }
            OperatorSpec::Aggregate { kind } => Box::new(Aggregate::new(*kind, chain)),
        };
    }
    Ok(chain)
}

fn validate_requirements(specs: &[OperatorSpec]) -> Result<(), QueryParserError> {
    let mut have_group_by = false;
    for spec in specs {
        match spec {
            OperatorSpec::Filter { .. } => {}
            OperatorSpec::GroupByTime { step } => {
                if *step == 0 {
                    return Err(QueryParserError::InvalidStep(*step));
                }
                have_group_by = true;
            }
            OperatorSpec::GroupByTag { .. } => {
                have_group_by = true;
            }
            OperatorSpec::Aggregate { .. } => {
                if requirements_of(spec).contains(Requirements::GROUP_BY_REQUIRED) && !have_group_by
                {
                    return Err(QueryParserError::MissingGroupBy);
                }
            }
        }
    }
    Ok(())
}

fn requirements_of(spec: &OperatorSpec) -> Requirements {
    match spec {
        OperatorSpec::Filter { .. }
        | OperatorSpec::GroupByTime { .. }
        | OperatorSpec::GroupByTag { .. } => Requirements::NONE,
        OperatorSpec::Aggregate { .. } => Requirements::GROUP_BY_REQUIRED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Terminal;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tsdb_proto::{Sample, Status};

    struct Shared(Rc<RefCell<Vec<Sample>>>);
    impl crate::Cursor for Shared {
        fn put(&mut self, sample: Sample) -> bool {
            self.0.borrow_mut().push(sample);
            true
        }
        fn set_error(&mut self, _status: Status) {}
        fn complete(&mut self) {}
    }

    #[test]
    fn rejects_aggregate_without_group_by() {
        let specs = vec![OperatorSpec::Aggregate {
            kind: AggKind::Sum,
        }];
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out)));
        assert!(matches!(
            build_chain(&specs, HashMap::new(), HashSet::new(), terminal),
            Err(QueryParserError::MissingGroupBy)
        ));
    }

    #[test]
    fn rejects_zero_step_group_by_time() {
        let specs = vec![OperatorSpec::GroupByTime { step: 0 }];
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out)));
        assert!(matches!(
            build_chain(&specs, HashMap::new(), HashSet::new(), terminal),
            Err(QueryParserError::InvalidStep(0))
        ));
    }

    #[test]
    fn builds_group_by_time_then_aggregate() {
        let specs = vec![
            OperatorSpec::GroupByTime { step: 10 },
            OperatorSpec::Aggregate {
                kind: AggKind::Sum,
            },
        ];
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut chain = build_chain(&specs, HashMap::new(), HashSet::new(), terminal).unwrap();
        chain.start();
        assert!(chain.put(Sample::new(1, 3, 1.0)));
        assert!(chain.put(Sample::new(1, 7, 2.0)));
        assert!(chain.put(Sample::new(1, 12, 3.0)));
        chain.complete();

        let samples = out.borrow();
        assert!(samples.iter().any(|s| s.payload.value == 3.0));
    }

    #[test]
    fn filter_drops_ids_outside_the_resolved_set() {
        let specs = vec![OperatorSpec::Filter {
            predicate: "tag:host=a".to_string(),
        }];
        let mut filter_ids = HashSet::new();
        filter_ids.insert(1);
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut chain = build_chain(&specs, HashMap::new(), filter_ids, terminal).unwrap();
        chain.start();
        assert!(chain.put(Sample::new(1, 1, 1.0)));
        assert!(chain.put(Sample::new(2, 2, 2.0)));
        chain.complete();

        let samples = out.borrow();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].param_id, 1);
    }
}
