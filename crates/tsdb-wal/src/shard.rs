use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tsdb_proto::InputRecord;

use crate::codec;
use crate::config::WalConfig;
use crate::error::WalError;
use crate::segment::{list_segments, OpenSegment};

/// One append-only partition of the input log. Exactly one session writes
/// to a given shard at a time (enforced by the pinning registry one layer
/// up, in `tsdb-storage`); the shard itself only assumes a single active
/// buffer writer, which a `Mutex` makes safe regardless.
pub struct Shard {
    dir: PathBuf,
    current: Mutex<Vec<u8>>,
    free: Receiver<Vec<u8>>,
    to_fsync: Sender<Vec<u8>>,
    rotate_threshold: usize,
    hard_cap: usize,
    /// Highest segment sequence number confirmed fsynced.
    durable_seq: Arc<AtomicU64>,
    /// Segments with sequence < watermark are eligible for reclamation.
    watermark: Arc<AtomicU64>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl Shard {
    pub fn open(config: &WalConfig, index: usize) -> Result<Self, WalError> {
        let dir = config.shard_dir(index);
        std::fs::create_dir_all(&dir)?;

        let existing = list_segments(&dir)?;
        let next_seq = existing.last().map(|s| s + 1).unwrap_or(0);

        let (to_fsync, fsync_rx) = bounded::<Vec<u8>>(config.channel_capacity);
        let (free_tx, free_rx) = bounded::<Vec<u8>>(config.channel_capacity);
        for _ in 0..config.channel_capacity {
            free_tx.send(Vec::with_capacity(config.rotate_threshold)).ok();
        }

        let durable_seq = Arc::new(AtomicU64::new(0));
        let segment_max_bytes = config.segment_max_bytes;
        let worker_dir = dir.clone();
        let worker_durable = durable_seq.clone();

        let worker = std::thread::Builder::new()
            .name(format!("tsdb-wal-fsync-{index}"))
            .spawn(move || {
                fsync_loop(
                    worker_dir,
                    next_seq,
                    segment_max_bytes,
                    fsync_rx,
                    free_tx,
                    worker_durable,
                )
            })
            .map_err(WalError::Io)?;

        Ok(Shard {
            dir,
            current: Mutex::new(Vec::with_capacity(config.rotate_threshold)),
            free: free_rx,
            to_fsync,
            rotate_threshold: config.rotate_threshold,
            hard_cap: config.hard_cap,
            durable_seq,
            watermark: Arc::new(AtomicU64::new(0)),
            worker: Some(worker),
        })
    }

    /// Appends `record`, batching into the in-memory buffer and rotating it
    /// to the fsync worker once the rotate threshold is crossed. Returns
    /// `WouldStall` (without mutating any state) if the buffer is already
    /// past `hard_cap`, i.e. the fsync worker is falling behind.
    pub fn append(&self, record: &InputRecord) -> Result<(), WalError> {
        let encoded = codec::encode(record);
        let mut guard = self.current.lock();
        if guard.len() + encoded.len() > self.hard_cap {
            return Err(WalError::WouldStall);
        }
        guard.extend_from_slice(&encoded);

        if guard.len() >= self.rotate_threshold {
            if let Ok(mut fresh) = self.free.try_recv() {
                fresh.clear();
                let full = std::mem::replace(&mut *guard, fresh);
                drop(guard);
                // capacity is sized 1:1 with `free`, so this cannot block
                // on a healthy worker; a disconnected receiver means the
                // worker died, which is surfaced by the degraded-engine
                // latch one layer up.
                let _ = self.to_fsync.try_send(full);
            }
        }
        Ok(())
    }

    pub fn durable_seq(&self) -> u64 {
        self.durable_seq.load(Ordering::Acquire)
    }

    pub fn set_watermark(&self, seq: u64) {
        self.watermark.store(seq, Ordering::Release);
    }

    /// Deletes closed segments below the current watermark.
    pub fn reclaim(&self) -> std::io::Result<usize> {
        let watermark = self.watermark.load(Ordering::Acquire);
        let mut removed = 0;
        for seq in list_segments(&self.dir)? {
            if seq < watermark {
                let _ = std::fs::remove_file(crate::segment::segment_path(&self.dir, seq));
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl Drop for Shard {
    fn drop(&mut self) {
        // Force any buffered-but-unrotated tail out before the worker
        // channel closes, so `close()` doesn't lose the final partial
        // buffer.
        let mut guard = self.current.lock();
        if !guard.is_empty() {
            let full = std::mem::take(&mut *guard);
            let _ = self.to_fsync.send(full);
        }
        drop(guard);
        // Dropping `to_fsync` (implicitly, as `self` is dropped) closes the
        // channel; the worker exits its loop once drained.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn fsync_loop(
    dir: PathBuf,
    start_seq: u64,
    segment_max_bytes: u64,
    fsync_rx: Receiver<Vec<u8>>,
    free_tx: Sender<Vec<u8>>,
    durable_seq: Arc<AtomicU64>,
) {
    let mut segment = match OpenSegment::create(&dir, start_seq) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(?err, ?dir, "failed to open initial wal segment");
            return;
        }
    };

    for mut buf in fsync_rx.iter() {
        if let Err(err) = segment.append(&buf) {
            tracing::error!(?err, seq = segment.seq, "wal segment append failed");
            return;
        }
        if let Err(err) = segment.sync() {
            tracing::error!(?err, seq = segment.seq, "wal segment fsync failed");
            return;
        }
        durable_seq.store(segment.seq, Ordering::Release);

        if segment.len >= segment_max_bytes {
            match OpenSegment::create(&dir, segment.seq + 1) {
                Ok(next) => segment = next,
                Err(err) => {
                    tracing::error!(?err, ?dir, "failed to roll wal segment");
                    return;
                }
            }
        }

        buf.clear();
        let _ = free_tx.send(buf);
    }
}
