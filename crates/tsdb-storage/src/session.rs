use std::cell::Cell;
use std::sync::Arc;

use tsdb_names::{NameRegistry, ResolveOutcome};
use tsdb_proto::{InputRecord, ParamId};
use tsdb_query::Cursor;

use crate::error::Error;
use crate::pipeline;
use crate::storage::Storage;

/// Per-writer handle (spec.md §4.4): a local `NameRegistry` view, a log
/// shard established lazily on first write and pinned for the session's
/// lifetime, and a back-reference to `Storage`. Not `Sync` — the engine's
/// contract is one session per application thread, enforced here only by
/// the lazily-pinned shard index being a plain `Cell`.
pub struct Session {
    storage: Arc<Storage>,
    names: NameRegistry,
    shard: Cell<Option<usize>>,
}

impl Session {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        let names = NameRegistry::new(Arc::clone(storage.names()));
        Session {
            storage,
            names,
            shard: Cell::new(None),
        }
    }

    fn shard(&self) -> usize {
        if let Some(shard) = self.shard.get() {
            return shard;
        }
        let shard = self.storage.pin_shard();
        self.shard.set(Some(shard));
        shard
    }

    /// Resolves `raw` to an id, allocating and declaring it in the input
    /// log on first observation (spec.md §4.1 `resolve`).
    pub fn init_series_id(&mut self, raw: &str) -> Result<ParamId, Error> {
        self.storage.ensure_running()?;
        let (id, outcome) = self.names.resolve(raw)?;
        if outcome == ResolveOutcome::Allocated {
            self.declare(id, raw)?;
        }
        Ok(id)
    }

    /// Resolves the joined form `a:b:c tag=v`, declaring any newly
    /// allocated sub-names.
    pub fn get_series_ids(&mut self, joined: &str) -> Result<Vec<ParamId>, Error> {
        self.storage.ensure_running()?;
        let resolved = self.names.get_series_ids(joined)?;
        let mut ids = Vec::with_capacity(resolved.len());
        for (id, outcome) in resolved {
            if outcome == ResolveOutcome::Allocated {
                let name = self.names.name_of(id)?;
                self.declare(id, &name)?;
            }
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn get_series_name(&self, id: ParamId) -> Result<String, Error> {
        Ok(self.names.name_of(id)?)
    }

    fn declare(&self, id: ParamId, raw: &str) -> Result<(), Error> {
        let canonical = self.names.name_of(id).unwrap_or_else(|_| raw.to_string());
        self.storage.wal_append(
            self.shard(),
            &InputRecord::SeriesDecl {
                id,
                canonical_name: canonical,
            },
        )
    }

    /// The write pipeline of spec.md §4.4: resolve (if needed), append to
    /// the log, hand off to the column store, forward any rescue-point
    /// update.
    pub fn write(&mut self, param_id: ParamId, timestamp: u64, value: f64) -> Result<(), Error> {
        self.storage.ensure_running()?;

        self.storage.wal_append(
            self.shard(),
            &InputRecord::Write {
                id: param_id,
                timestamp,
                value,
            },
        )?;

        let addrs = self.storage.columns().write(param_id, timestamp, value);
        if !addrs.is_empty() {
            self.storage.update_rescue_points(param_id, addrs);
        }
        Ok(())
    }

    /// Convenience combining `init_series_id` and `write` for a raw name,
    /// the common single-series case.
    pub fn write_named(&mut self, raw: &str, timestamp: u64, value: f64) -> Result<(), Error> {
        let id = self.init_series_id(raw)?;
        self.write(id, timestamp, value)
    }

    pub fn query(&mut self, cursor: &mut dyn Cursor, text: &str) -> Result<(), Error> {
        self.storage.ensure_running()?;
        pipeline::run_query(&self.storage, &mut self.names, cursor, text)
    }

    pub fn suggest(&self, cursor: &mut dyn Cursor, prefix: &str) -> Result<(), Error> {
        self.storage.ensure_running()?;
        pipeline::run_suggest(&self.names, cursor, prefix)
    }

    pub fn search(&self, cursor: &mut dyn Cursor, predicate_text: &str) -> Result<(), Error> {
        self.storage.ensure_running()?;
        pipeline::run_search(&self.names, cursor, predicate_text)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.storage.release_session();
    }
}
