use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use parking_lot::Mutex;
use tsdb_proto::{ParamId, Timestamp};

/// Paged volume manager (spec.md §1: "out of scope, specified only at its
/// interface"). The facade only needs to know volumes were opened for the
/// declared set; paging/allocation live entirely outside this crate.
pub trait BlockStore: Send + Sync {
    fn open_volumes(&self, num_volumes: usize, page_size: usize) -> std::io::Result<()>;
}

/// In-memory stand-in: there is nothing to page, so opening always succeeds.
#[derive(Default)]
pub struct InMemoryBlockStore;

impl BlockStore for InMemoryBlockStore {
    fn open_volumes(&self, _num_volumes: usize, _page_size: usize) -> std::io::Result<()> {
        Ok(())
    }
}

/// Outcome of a [`ColumnStore::write`]: `Some(addrs)` when the write
/// triggered a tail rotation and the caller must forward the new rescue
/// addresses to `Storage::update_rescue_points` (spec.md §4.4 step 3).
pub type RescueAddrs = Vec<u64>;

/// Tree-per-series compressed encoding (spec.md §1, out of scope). The
/// reference implementation here is an uncompressed in-memory/JSON-backed
/// `BTreeMap<Timestamp, f64>` per series — enough to make writes and
/// range scans observably correct, not a real column engine.
pub trait ColumnStore: Send + Sync {
    /// Writes one point, overwriting any existing value at `(id, ts)` per
    /// spec.md §8's "later write wins" invariant. Returns rescue addresses
    /// on a (simulated) tail rotation.
    fn write(&self, id: ParamId, ts: Timestamp, value: f64) -> RescueAddrs;

    /// Inclusive-bounds range scan in the direction `begin <= end` implies
    /// forward, else reverse (spec.md §4.5).
    fn scan(&self, id: ParamId, begin: Timestamp, end: Timestamp) -> Vec<(Timestamp, f64)>;

    /// Forces all in-memory tails durable. Called by the sync worker and by
    /// `close()`.
    fn flush(&self) -> std::io::Result<()>;

    /// Replays a write recovered from the input log at open, bypassing the
    /// rotation counter (it is not a live write needing a rescue point).
    fn apply_recovered(&self, id: ParamId, ts: Timestamp, value: f64);
}

const ROTATE_EVERY: u64 = 128;

/// Reference `ColumnStore`: a `Mutex`-guarded map of per-series `BTreeMap`s,
/// optionally mirrored to a JSON file on `flush()` so construction mode (b)
/// (open-from-path) survives a close/reopen cycle in tests.
pub struct JsonColumnStore {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    series: HashMap<ParamId, BTreeMap<Timestamp, f64>>,
    write_counts: HashMap<ParamId, u64>,
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct OnDisk {
    series: Vec<(ParamId, Vec<(Timestamp, f64)>)>,
}

impl JsonColumnStore {
    pub fn in_memory() -> Self {
        JsonColumnStore {
            path: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Loads `path` if it exists, otherwise starts empty; `flush()` persists
    /// back to the same path.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let mut inner = Inner::default();
        if path.exists() {
            let bytes = std::fs::read(&path)?;
            let doc: OnDisk = serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            for (id, points) in doc.series {
                inner.series.insert(id, points.into_iter().collect());
            }
        }
        Ok(JsonColumnStore {
            path: Some(path),
            inner: Mutex::new(inner),
        })
    }

}

impl ColumnStore for JsonColumnStore {
    fn write(&self, id: ParamId, ts: Timestamp, value: f64) -> RescueAddrs {
        let mut inner = self.inner.lock();
        inner.series.entry(id).or_default().insert(ts, value);
        let count = inner.write_counts.entry(id).or_insert(0);
        *count += 1;
        if *count % ROTATE_EVERY == 0 {
            vec![*count]
        } else {
            Vec::new()
        }
    }

    fn scan(&self, id: ParamId, begin: Timestamp, end: Timestamp) -> Vec<(Timestamp, f64)> {
        let inner = self.inner.lock();
        let Some(series) = inner.series.get(&id) else {
            return Vec::new();
        };
        let (lo, hi) = if begin <= end { (begin, end) } else { (end, begin) };
        let mut out: Vec<(Timestamp, f64)> = series
            .range(lo..=hi)
            .map(|(ts, v)| (*ts, *v))
            .collect();
        if begin > end {
            out.reverse();
        }
        out
    }

    fn apply_recovered(&self, id: ParamId, ts: Timestamp, value: f64) {
        self.inner.lock().series.entry(id).or_default().insert(ts, value);
    }

    fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let inner = self.inner.lock();
        let doc = OnDisk {
            series: inner
                .series
                .iter()
                .map(|(id, points)| (*id, points.iter().map(|(t, v)| (*t, *v)).collect()))
                .collect(),
        };
        let bytes = serde_json::to_vec(&doc)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    }
}

/// Durable registry of series id<->name and rescue points (spec.md §1/§3,
/// out of scope). Reference implementation is a single JSON "relational
/// file" mirroring the on-disk artifact spec.md §6 describes.
pub trait MetadataStore: Send + Sync {
    fn load_dictionary(&self) -> std::io::Result<Vec<(ParamId, String)>>;
    fn save_dictionary(&self, entries: &[(ParamId, String)]) -> std::io::Result<()>;
    fn load_rescue_points(&self) -> std::io::Result<HashMap<ParamId, RescueAddrs>>;
    fn save_rescue_points(&self, points: &HashMap<ParamId, RescueAddrs>) -> std::io::Result<()>;
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct MetaDoc {
    dictionary: Vec<(ParamId, String)>,
    rescue_points: Vec<(ParamId, RescueAddrs)>,
}

pub struct JsonMetadataStore {
    path: Option<PathBuf>,
    inner: Mutex<MetaDoc>,
}

impl JsonMetadataStore {
    pub fn in_memory() -> Self {
        JsonMetadataStore {
            path: None,
            inner: Mutex::new(MetaDoc::default()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        } else {
            MetaDoc::default()
        };
        Ok(JsonMetadataStore {
            path: Some(path),
            inner: Mutex::new(doc),
        })
    }

    fn persist(&self, doc: &MetaDoc) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(doc)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    }
}

impl MetadataStore for JsonMetadataStore {
    fn load_dictionary(&self) -> std::io::Result<Vec<(ParamId, String)>> {
        Ok(self.inner.lock().dictionary.clone())
    }

    fn save_dictionary(&self, entries: &[(ParamId, String)]) -> std::io::Result<()> {
        let mut inner = self.inner.lock();
        inner.dictionary = entries.to_vec();
        self.persist(&inner)
    }

    fn load_rescue_points(&self) -> std::io::Result<HashMap<ParamId, RescueAddrs>> {
        Ok(self.inner.lock().rescue_points.iter().cloned().collect())
    }

    fn save_rescue_points(&self, points: &HashMap<ParamId, RescueAddrs>) -> std::io::Result<()> {
        let mut inner = self.inner.lock();
        inner.rescue_points = points.iter().map(|(k, v)| (*k, v.clone())).collect();
        self.persist(&inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_store_overwrites_same_timestamp() {
        let store = JsonColumnStore::in_memory();
        store.write(1, 5, 1.0);
        store.write(1, 5, 2.0);
        assert_eq!(store.scan(1, 0, 10), vec![(5, 2.0)]);
    }

    #[test]
    fn column_store_reverse_scan() {
        let store = JsonColumnStore::in_memory();
        store.write(1, 1, 1.0);
        store.write(1, 2, 2.0);
        assert_eq!(store.scan(1, 2, 1), vec![(2, 2.0), (1, 1.0)]);
    }

    #[test]
    fn metadata_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        {
            let store = JsonMetadataStore::open(&path).unwrap();
            store
                .save_dictionary(&[(0, "cpu host=a".to_string())])
                .unwrap();
        }
        let store = JsonMetadataStore::open(&path).unwrap();
        assert_eq!(
            store.load_dictionary().unwrap(),
            vec![(0, "cpu host=a".to_string())]
        );
    }
}
