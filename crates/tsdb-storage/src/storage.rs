use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex as StdMutex};

use parking_lot::Mutex;
use tsdb_names::GlobalDictionary;
use tsdb_proto::{InputRecord, ParamId, Status};
use tsdb_wal::{InputLog, RecoveryReport, WalConfig};

use crate::config::StorageConfig;
use crate::error::Error;
use crate::session::Session;
use crate::traits::{BlockStore, ColumnStore, MetadataStore, RescueAddrs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initializing,
    Recovering,
    Running,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    pub series_count: usize,
    pub collisions: u64,
    pub degraded: bool,
}

/// The top-level facade (spec.md §4.3): owns every subsystem, runs the
/// background sync worker, and brokers `Session` creation and the close
/// barrier. Sessions hold an `Arc<Storage>`; `Storage` only ever holds a
/// plain count of live sessions (not handles to them), which is enough for
/// the close barrier and avoids the Storage/Session reference cycle
/// (spec.md §9).
pub struct Storage {
    config: StorageConfig,
    state: Mutex<State>,
    degraded: AtomicBool,
    names: Arc<GlobalDictionary>,
    columns: Arc<dyn ColumnStore>,
    blocks: Arc<dyn BlockStore>,
    meta: Arc<dyn MetadataStore>,
    wal: Mutex<Option<InputLog>>,
    rescue_points: Mutex<HashMap<ParamId, RescueAddrs>>,
    collisions: AtomicU64,
    next_shard: AtomicUsize,
    last_recovery: RecoveryReport,
    live_sessions: Arc<(StdMutex<usize>, Condvar)>,
    sync_worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    sync_stop: Arc<(StdMutex<bool>, Condvar)>,
}

impl Storage {
    /// Construction mode (b): open-from-path. Loads metadata, opens
    /// volumes, opens or creates the input log, and runs recovery — the
    /// five-step open sequence of spec.md §4.3.
    pub fn open(base_dir: impl AsRef<Path>, config: StorageConfig) -> Result<Arc<Self>, Error> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir)?;
        let meta: Arc<dyn MetadataStore> = Arc::new(crate::traits::JsonMetadataStore::open(
            StorageConfig::metadata_path(base_dir),
        )?);
        let columns: Arc<dyn ColumnStore> = Arc::new(crate::traits::JsonColumnStore::open(
            StorageConfig::columns_path(base_dir),
        )?);
        let blocks: Arc<dyn BlockStore> = Arc::new(crate::traits::InMemoryBlockStore::default());
        Self::open_with(config, meta, blocks, columns, base_dir.join("wal"))
    }

    /// Construction mode (a): an empty, fully in-memory database (tests).
    /// The input log still lives on disk (it is inherently durable), so
    /// callers supply a scratch directory for it.
    pub fn open_in_memory(
        config: StorageConfig,
        wal_dir: impl AsRef<Path>,
    ) -> Result<Arc<Self>, Error> {
        let meta: Arc<dyn MetadataStore> = Arc::new(crate::traits::JsonMetadataStore::in_memory());
        let columns: Arc<dyn ColumnStore> = Arc::new(crate::traits::JsonColumnStore::in_memory());
        let blocks: Arc<dyn BlockStore> = Arc::new(crate::traits::InMemoryBlockStore::default());
        Self::open_with(config, meta, blocks, columns, wal_dir)
    }

    /// Construction mode (c): fully injected dependencies (tests exercising
    /// a custom `BlockStore`/`ColumnStore`/`MetadataStore`).
    pub fn open_with(
        config: StorageConfig,
        meta: Arc<dyn MetadataStore>,
        blocks: Arc<dyn BlockStore>,
        columns: Arc<dyn ColumnStore>,
        wal_dir: impl AsRef<Path>,
    ) -> Result<Arc<Self>, Error> {
        // Step 1: metadata, global dictionary, rescue points.
        let names = GlobalDictionary::new();
        names.load_snapshot(meta.load_dictionary()?);
        let rescue_points = Mutex::new(meta.load_rescue_points()?);

        // Step 2: volumes.
        blocks.open_volumes(config.num_volumes, config.page_size)?;

        // Step 3: column store is already constructed by the caller; the
        // reference implementation has no per-series open step of its own.

        // Step 4: input log + recovery.
        let wal_config: WalConfig = config.wal_config(wal_dir.as_ref());
        let recovery = tsdb_wal::scan(&wal_config)?;
        tsdb_wal::repair(&wal_config, &recovery)?;
        if !recovery.series.is_empty() {
            // IDs assigned after the last metadata snapshot are contiguous
            // with it, since allocation is monotonic and global.
            names.load_snapshot(recovery.series.clone());
        }
        for &(id, ts, value) in &recovery.writes {
            columns.apply_recovered(id, ts, value);
        }
        tracing::info!(
            series = recovery.report.series_declared,
            writes = recovery.report.writes_recovered,
            dropped = recovery.report.writes_dropped_undeclared,
            torn = recovery.report.torn_segments,
            collisions = recovery.report.collisions,
            "input log recovery complete"
        );
        let collisions = AtomicU64::new(recovery.report.collisions as u64);
        let last_recovery = recovery.report.clone();
        let wal = InputLog::open(&wal_config)?;

        // Step 5: start the sync worker and mark Running.
        let storage = Arc::new(Storage {
            config,
            state: Mutex::new(State::Running),
            degraded: AtomicBool::new(false),
            names,
            columns,
            blocks,
            meta,
            wal: Mutex::new(Some(wal)),
            rescue_points,
            collisions,
            next_shard: AtomicUsize::new(0),
            last_recovery,
            live_sessions: Arc::new((StdMutex::new(0), Condvar::new())),
            sync_worker: Mutex::new(None),
            sync_stop: Arc::new((StdMutex::new(false), Condvar::new())),
        });
        storage.spawn_sync_worker();
        Ok(storage)
    }

    pub fn create_write_session(self: &Arc<Self>) -> Result<Session, Error> {
        self.ensure_running()?;
        *self.live_sessions.0.lock().unwrap() += 1;
        Ok(Session::new(Arc::clone(self)))
    }

    pub fn get_stats(&self) -> StorageStats {
        StorageStats {
            series_count: self.names.len(),
            collisions: self.collisions.load(Ordering::Acquire),
            degraded: self.degraded.load(Ordering::Acquire),
        }
    }

    pub fn generate_recovery_report(&self) -> RecoveryReport {
        self.last_recovery.clone()
    }

    /// Lays down an on-disk database's directory structure without opening
    /// it (spec.md §6's `new_database(base, meta_path, volumes_path,
    /// num_volumes, page_size, allocate) → status`), distinct from `open`,
    /// which additionally runs recovery and starts the sync worker.
    /// `meta_path`/`volumes_path` are relative to `base`; when `allocate` is
    /// set, each of the `num_volumes` volume files is pre-sized to
    /// `page_size` bytes up front rather than growing lazily on first write.
    pub fn new_database(
        base: impl AsRef<Path>,
        meta_path: impl AsRef<Path>,
        volumes_path: impl AsRef<Path>,
        num_volumes: usize,
        page_size: usize,
        allocate: bool,
    ) -> Result<Status, Error> {
        let base = base.as_ref();
        if base.exists() {
            return Ok(Status::BadInput);
        }
        std::fs::create_dir_all(base)?;

        let meta_path = base.join(meta_path.as_ref());
        if let Some(parent) = meta_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        crate::traits::JsonMetadataStore::open(meta_path.clone())?;

        let volumes_path = base.join(volumes_path.as_ref());
        std::fs::create_dir_all(&volumes_path)?;
        if allocate {
            for i in 0..num_volumes {
                let file = std::fs::File::create(volumes_path.join(format!("vol-{i}.dat")))?;
                file.set_len(page_size as u64)?;
            }
        }
        Ok(Status::Ok)
    }

    /// Renders the current state (`get_stats` plus the last recovery report)
    /// as a text report and writes it to `out`, matching spec.md §6's
    /// `generate_report(path, out)` — a thin serialization over the two
    /// richer accessors already exposed for programmatic callers.
    pub fn generate_report(&self, out: impl AsRef<Path>) -> Result<(), Error> {
        let stats = self.get_stats();
        let recovery = self.generate_recovery_report();
        let report = format!(
            "series_count={}\ncollisions={}\ndegraded={}\nwrites_recovered={}\nwrites_dropped_undeclared={}\nseries_declared={}\ntorn_segments={}\n",
            stats.series_count,
            stats.collisions,
            stats.degraded,
            recovery.writes_recovered,
            recovery.writes_dropped_undeclared,
            recovery.series_declared,
            recovery.torn_segments,
        );
        std::fs::write(out, report)?;
        Ok(())
    }

    /// Deletes an on-disk database that is not currently open. Refuses
    /// unless `force` is set, matching spec.md §6's `remove_storage(name,
    /// wal_path, force)`.
    pub fn remove_storage(base_dir: impl AsRef<Path>, force: bool) -> std::io::Result<()> {
        let dir = base_dir.as_ref();
        if !dir.exists() {
            return Ok(());
        }
        if !force {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "refusing to remove storage without force=true",
            ));
        }
        std::fs::remove_dir_all(dir)
    }

    /// Waits for in-flight sessions to finish, stops the sync worker,
    /// flushes the column store, fsyncs metadata, and closes the input
    /// log. Idempotent: a second call returns immediately.
    pub fn close(&self) -> Result<(), Error> {
        {
            let mut state = self.state.lock();
            if *state == State::Closed || *state == State::Closing {
                return Ok(());
            }
            *state = State::Closing;
        }

        let (lock, cvar) = &*self.live_sessions;
        let mut count = lock.lock().unwrap();
        while *count > 0 {
            count = cvar.wait(count).unwrap();
        }
        drop(count);

        {
            let mut stop = self.sync_stop.0.lock().unwrap();
            *stop = true;
        }
        self.sync_stop.1.notify_all();
        if let Some(handle) = self.sync_worker.lock().take() {
            let _ = handle.join();
        }

        self.columns.flush()?;
        let snapshot = self.names.scan(|_, _| true);
        self.meta.save_dictionary(&snapshot)?;
        let rescue = self.rescue_points.lock().clone();
        self.meta.save_rescue_points(&rescue)?;
        *self.wal.lock() = None;

        *self.state.lock() = State::Closed;
        Ok(())
    }

    pub(crate) fn names(&self) -> &Arc<GlobalDictionary> {
        &self.names
    }

    pub(crate) fn columns(&self) -> &Arc<dyn ColumnStore> {
        &self.columns
    }

    pub(crate) fn pin_shard(&self) -> usize {
        self.next_shard.fetch_add(1, Ordering::Relaxed) % self.config.num_shards.max(1)
    }

    pub(crate) fn wal_append(&self, shard: usize, record: &InputRecord) -> Result<(), Error> {
        let guard = self.wal.lock();
        let wal = guard.as_ref().ok_or(Error::Closed)?;
        wal.append(shard, record).map_err(Error::from)
    }

    pub(crate) fn update_rescue_points(&self, id: ParamId, addrs: RescueAddrs) {
        self.rescue_points.lock().insert(id, addrs);
    }

    pub(crate) fn ensure_running(&self) -> Result<(), Error> {
        if self.degraded.load(Ordering::Acquire) {
            return Err(Error::Degraded);
        }
        if *self.state.lock() != State::Running {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub(crate) fn release_session(&self) {
        let mut count = self.live_sessions.0.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.live_sessions.1.notify_all();
        }
    }

    fn spawn_sync_worker(self: &Arc<Self>) {
        let storage = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("tsdb-sync".to_string())
            .spawn(move || sync_loop(storage))
            .expect("failed to spawn sync worker thread");
        *self.sync_worker.lock() = Some(handle);
    }

    fn sync_tick(&self) {
        if let Err(err) = self.columns.flush() {
            tracing::error!(?err, "column store flush failed, entering degraded state");
            self.degraded.store(true, Ordering::Release);
            return;
        }
        let rescue = self.rescue_points.lock().clone();
        if let Err(err) = self.meta.save_rescue_points(&rescue) {
            tracing::error!(?err, "rescue point persist failed, entering degraded state");
            self.degraded.store(true, Ordering::Release);
            return;
        }

        let guard = self.wal.lock();
        let Some(wal) = guard.as_ref() else { return };
        let mut reclaimed_total = 0;
        for shard in 0..wal.num_shards() {
            if let Some(seq) = wal.durable_seq(shard) {
                wal.set_watermark(shard, seq);
            }
        }
        reclaimed_total += wal.reclaim_all();
        tracing::debug!(reclaimed = reclaimed_total, "sync worker tick complete");
    }
}

fn sync_loop(storage: Arc<Storage>) {
    loop {
        let guard = storage.sync_stop.0.lock().unwrap();
        if *guard {
            break;
        }
        let (guard, _timeout) = storage
            .sync_stop
            .1
            .wait_timeout(guard, storage.config.sync_period)
            .unwrap();
        let stop = *guard;
        drop(guard);
        if stop {
            break;
        }
        storage.sync_tick();
    }
}
