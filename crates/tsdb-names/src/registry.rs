use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tsdb_proto::ParamId;

use crate::canon::{self, ParsedName};
use crate::dictionary::GlobalDictionary;
use crate::matcher::{Matcher, MatcherScope, MatcherSlot};
use crate::predicate::Predicate;
use crate::NamesError;

/// Outcome of a single [`NameRegistry::resolve`] call. `Allocated` tells the
/// caller (a `Session`) that a fresh id was minted and a `SeriesDecl` must
/// be appended to the input log — `NameRegistry` has no log dependency of
/// its own, so it cannot do that append itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Cached,
    GlobalHit,
    Allocated,
}

/// Per-session view of the name space: not thread-safe by construction
/// (owned by exactly one `Session`), backed by a lazily-populated local
/// cache over the shared, synchronized [`GlobalDictionary`].
pub struct NameRegistry {
    global: Arc<GlobalDictionary>,
    local: HashMap<Box<str>, ParamId>,
    matchers: MatcherSlot,
}

impl NameRegistry {
    pub fn new(global: Arc<GlobalDictionary>) -> Self {
        NameRegistry {
            global,
            local: HashMap::new(),
            matchers: MatcherSlot::default(),
        }
    }

    /// Resolves a single (non-joined) raw name, allocating a new id on
    /// global miss. Never consults or installs a matcher override — those
    /// only affect `name_of`.
    pub fn resolve(&mut self, raw: &str) -> Result<(ParamId, ResolveOutcome), NamesError> {
        let parsed = canon::parse_single(raw)?;
        self.resolve_parsed(&parsed)
    }

    fn resolve_parsed(&mut self, parsed: &ParsedName) -> Result<(ParamId, ResolveOutcome), NamesError> {
        let canonical = parsed.canonical();
        if let Some(id) = self.local.get(canonical.as_str()) {
            return Ok((*id, ResolveOutcome::Cached));
        }
        if let Some(id) = self.global.lookup(&canonical) {
            self.local.insert(canonical.into_boxed_str(), id);
            return Ok((id, ResolveOutcome::GlobalHit));
        }
        let (id, allocated) = self.global.resolve_or_allocate(&canonical);
        self.local.insert(canonical.into_boxed_str(), id);
        Ok((
            id,
            if allocated {
                ResolveOutcome::Allocated
            } else {
                ResolveOutcome::GlobalHit
            },
        ))
    }

    /// Resolves the joined form `a:b:c tag=v` into ids for each sub-name,
    /// in input order. Fails with `BadInput` per [`canon::parse_joined`].
    pub fn get_series_ids(
        &mut self,
        raw: &str,
    ) -> Result<Vec<(ParamId, ResolveOutcome)>, NamesError> {
        let names = canon::parse_joined(raw)?;
        names.iter().map(|p| self.resolve_parsed(p)).collect()
    }

    /// Resolves the canonical string for `id`. Consults the currently
    /// installed matcher override (if any) before the authoritative
    /// dictionary, so a transient group-by-tag mapping can shadow it.
    pub fn name_of(&self, id: ParamId) -> Result<String, NamesError> {
        if let Some(name) = self.matchers.top_name_of(id) {
            return Ok(name);
        }
        self.global.name_of(id).ok_or(NamesError::NotFound(id))
    }

    pub fn suggest(&self, prefix: &str) -> Vec<(ParamId, String)> {
        self.search(&Predicate::MetricStartsWith(prefix.to_string()))
    }

    pub fn search(&self, predicate: &Predicate) -> Vec<(ParamId, String)> {
        self.global.scan(|_id, name| predicate.matches(name))
    }

    /// Installs `matcher` for the lifetime of the returned scope. Scopes
    /// nest LIFO: dropping an inner scope restores whatever was active
    /// when it was created, even if that was another override.
    pub fn set_matcher(&self, matcher: Rc<dyn Matcher>) -> MatcherScope {
        self.matchers.push(matcher)
    }

    pub fn global_len(&self) -> usize {
        self.global.len()
    }
}
