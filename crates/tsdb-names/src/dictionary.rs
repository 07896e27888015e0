use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tsdb_proto::ParamId;

/// Process-wide, authoritative `canonical string <-> param_id` table.
///
/// Reads take a shared guard (many concurrent readers); the single
/// allocation path takes the write guard only long enough to insert —
/// grounded on the `Arc<RwLock<HashMap>>` read-mostly pattern, since the
/// id space only ever grows and readers vastly outnumber writers.
pub struct GlobalDictionary {
    inner: RwLock<Inner>,
}

struct Inner {
    by_name: HashMap<Box<str>, ParamId>,
    by_id: Vec<Box<str>>,
}

impl GlobalDictionary {
    pub fn new() -> Arc<Self> {
        Arc::new(GlobalDictionary {
            inner: RwLock::new(Inner {
                by_name: HashMap::new(),
                by_id: Vec::new(),
            }),
        })
    }

    /// Rebuilds the table from a persisted snapshot, e.g. on `Storage::open`.
    /// `entries` must be in `param_id` order with no gaps.
    pub fn load_snapshot(&self, entries: impl IntoIterator<Item = (ParamId, String)>) {
        let mut inner = self.inner.write();
        for (id, name) in entries {
            let boxed: Box<str> = name.into_boxed_str();
            debug_assert_eq!(id as usize, inner.by_id.len());
            inner.by_name.insert(boxed.clone(), id);
            inner.by_id.push(boxed);
        }
    }

    pub fn lookup(&self, canonical: &str) -> Option<ParamId> {
        self.inner.read().by_name.get(canonical).copied()
    }

    pub fn name_of(&self, id: ParamId) -> Option<String> {
        self.inner
            .read()
            .by_id
            .get(id as usize)
            .map(|s| s.to_string())
    }

    /// Allocates a new id for `canonical` if it is still unseen. Returns the
    /// (possibly pre-existing) id and whether this call actually allocated.
    /// Serializes against other allocators: the write guard is held for the
    /// whole check-then-insert.
    pub fn resolve_or_allocate(&self, canonical: &str) -> (ParamId, bool) {
        let mut inner = self.inner.write();
        if let Some(id) = inner.by_name.get(canonical) {
            return (*id, false);
        }
        let id = inner.by_id.len() as ParamId;
        let boxed: Box<str> = canonical.into();
        inner.by_name.insert(boxed.clone(), id);
        inner.by_id.push(boxed);
        (id, true)
    }

    /// Snapshot of `(id, name)` pairs matching `pred`, for `suggest`/`search`.
    pub fn scan(&self, mut pred: impl FnMut(ParamId, &str) -> bool) -> Vec<(ParamId, String)> {
        let inner = self.inner.read();
        inner
            .by_id
            .iter()
            .enumerate()
            .filter(|(id, name)| pred(*id as ParamId, name))
            .map(|(id, name)| (id as ParamId, name.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_monotonically() {
        let dict = GlobalDictionary::new();
        let (id_a, new_a) = dict.resolve_or_allocate("cpu host=a");
        let (id_b, new_b) = dict.resolve_or_allocate("cpu host=b");
        let (id_a_again, new_a_again) = dict.resolve_or_allocate("cpu host=a");

        assert!(new_a && new_b);
        assert!(!new_a_again);
        assert_eq!(id_a, id_a_again);
        assert_ne!(id_a, id_b);
        assert_eq!(dict.name_of(id_a).as_deref(), Some("cpu host=a"));
    }

    #[test]
    fn snapshot_restores_ids() {
        let dict = GlobalDictionary::new();
        dict.load_snapshot(vec![(0, "cpu host=a".to_string()), (1, "mem host=a".to_string())]);
        assert_eq!(dict.lookup("mem host=a"), Some(1));
        let (id, is_new) = dict.resolve_or_allocate("mem host=a");
        assert_eq!(id, 1);
        assert!(!is_new);
    }
}
