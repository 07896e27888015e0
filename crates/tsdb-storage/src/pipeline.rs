use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use tsdb_names::NameRegistry;
use tsdb_proto::{ParamId, Sample, Status};
use tsdb_query::{Cursor, Node, OperatorSpec, OrderBy, ReshapeRequest, Terminal};

use crate::error::Error;
use crate::storage::Storage;

/// Adapts the caller's `&mut dyn Cursor` reference into an owned `Cursor`
/// value so it can be moved into a `Terminal`.
struct ExternalCursor<'a>(&'a mut dyn Cursor);

impl Cursor for ExternalCursor<'_> {
    fn put(&mut self, sample: Sample) -> bool {
        self.0.put(sample)
    }

    fn set_error(&mut self, status: Status) {
        self.0.set_error(status)
    }

    fn complete(&mut self) {
        self.0.complete()
    }
}

/// Parses `text`, builds the operator chain (4.5), and pumps every sample
/// the scan mode produces through it until the cursor refuses one or the
/// series are exhausted. A refused `put` halts the pipeline immediately
/// without calling `complete` (spec.md §8's backpressure property).
pub fn run_query(
    storage: &Arc<Storage>,
    names: &mut NameRegistry,
    cursor: &mut dyn Cursor,
    text: &str,
) -> Result<(), Error> {
    let (request, specs) = tsdb_query::parse_query(text)?;

    let needs_tag_map = specs
        .iter()
        .any(|s| matches!(s, OperatorSpec::GroupByTag { .. }));
    let (tag_map, _matcher_scope) = if needs_tag_map {
        build_tag_group(names, &request.select.ids, &specs)
    } else {
        (HashMap::new(), None)
    };

    let filter_ids = resolve_filter_ids(names, &request.select.ids, &specs)?;

    let terminal = Box::new(Terminal::new(ExternalCursor(cursor)));
    let mut chain = tsdb_query::build_chain(&specs, tag_map, filter_ids, terminal)?;
    chain.start();

    for sample in collect_samples(storage, &request) {
        if !chain.put(sample) {
            // Backpressure: the pipeline unwinds without `complete`.
            return Ok(());
        }
    }
    chain.complete();
    Ok(())
}

pub fn run_suggest(names: &NameRegistry, cursor: &mut dyn Cursor, prefix: &str) -> Result<(), Error> {
    emit_metadata_matches(cursor, names.suggest(prefix))
}

pub fn run_search(
    names: &NameRegistry,
    cursor: &mut dyn Cursor,
    predicate_text: &str,
) -> Result<(), Error> {
    let predicate = tsdb_query::parse_predicate(predicate_text)?;
    emit_metadata_matches(cursor, names.search(&predicate))
}

/// Metadata mode (spec.md §4.5): does not touch the column store, just
/// walks matching names. `Sample.payload` carries no string field, so the
/// name itself is not round-tripped through the cursor here — callers
/// resolve it separately via `Session::get_series_name`.
fn emit_metadata_matches(
    cursor: &mut dyn Cursor,
    matches: Vec<(ParamId, String)>,
) -> Result<(), Error> {
    for (id, _name) in matches {
        if !cursor.put(Sample::new(id, 0, 0.0)) {
            return Ok(());
        }
    }
    cursor.complete();
    Ok(())
}

fn collect_samples(storage: &Arc<Storage>, request: &ReshapeRequest) -> Vec<Sample> {
    let mut all = Vec::new();
    for &id in &request.select.ids {
        let points = storage.columns().scan(id, request.select.range.begin, request.select.range.end);
        all.extend(points.into_iter().map(|(ts, value)| Sample::new(id, ts, value)));
    }
    if request.order_by == OrderBy::Time {
        let forward = request.select.range.forward();
        all.sort_by(|a, b| {
            if forward {
                a.timestamp.cmp(&b.timestamp)
            } else {
                b.timestamp.cmp(&a.timestamp)
            }
        });
    }
    all
}

/// Resolves a `where` clause's predicate text (spec.md §6/§9) against the
/// query's selected ids, since the `Filter` node itself has no access to
/// `NameRegistry` and only knows how to test raw sample ids. Returns the
/// empty set (matching nothing, per `Filter`'s "drop is not backpressure"
/// contract) when no `Filter` operator is present.
fn resolve_filter_ids(
    names: &NameRegistry,
    ids: &[ParamId],
    specs: &[OperatorSpec],
) -> Result<HashSet<ParamId>, Error> {
    let Some(predicate_text) = specs.iter().find_map(|s| match s {
        OperatorSpec::Filter { predicate } => Some(predicate),
        _ => None,
    }) else {
        return Ok(HashSet::new());
    };
    let predicate = tsdb_query::parse_predicate(predicate_text)?;
    Ok(ids
        .iter()
        .copied()
        .filter(|&id| names.name_of(id).is_ok_and(|name| predicate.matches(&name)))
        .collect())
}

/// Builds the `source_id -> transient_id` map a `GroupByTag` operator
/// needs and installs the transient matcher (spec.md §4.1/§4.5) for the
/// query's lifetime. Distinct combinations of the requested tag values
/// each get one freshly minted transient id, offset well above the real
/// id space to avoid collisions.
fn build_tag_group(
    names: &NameRegistry,
    ids: &[ParamId],
    specs: &[OperatorSpec],
) -> (HashMap<ParamId, ParamId>, Option<tsdb_names::MatcherScope>) {
    let Some(tag_keys) = specs.iter().find_map(|s| match s {
        OperatorSpec::GroupByTag { tags } => Some(tags),
        _ => None,
    }) else {
        return (HashMap::new(), None);
    };

    const TRANSIENT_BASE: ParamId = 1 << 32;
    let mut map = HashMap::new();
    let mut labels: HashMap<ParamId, String> = HashMap::new();
    let mut group_ids: HashMap<String, ParamId> = HashMap::new();
    let mut next_transient = TRANSIENT_BASE;

    for &id in ids {
        let Ok(canonical) = names.name_of(id) else {
            continue;
        };
        let Ok(parsed) = tsdb_names::parse_single(&canonical) else {
            continue;
        };
        let group_key = tag_keys
            .iter()
            .map(|key| {
                let value = parsed
                    .tags
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("");
                format!("{key}={value}")
            })
            .collect::<Vec<_>>()
            .join(",");

        let transient = *group_ids.entry(group_key.clone()).or_insert_with(|| {
            let t = next_transient;
            next_transient += 1;
            t
        });
        map.insert(id, transient);
        labels.insert(transient, format!("group:{group_key}"));
    }

    let scope = names.set_matcher(Rc::new(move |id: ParamId| labels.get(&id).cloned()));
    (map, Some(scope))
}
