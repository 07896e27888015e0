//! Durable, crash-consistent, sharded append-only log of series
//! declarations and writes (spec.md §4.2). This crate owns the on-disk
//! format, segment rotation, the per-shard fsync worker thread, and the
//! recovery scan; it knows nothing about series names or the column
//! store — those are reconciled one layer up in `tsdb-storage`.

mod codec;
mod config;
mod error;
mod recovery;
mod segment;
mod shard;

pub use config::WalConfig;
pub use error::WalError;
pub use recovery::{repair, scan, RecoveryReport, RecoveryResult};
pub use shard::Shard;

use tsdb_proto::InputRecord;

/// The sharded input log. Each shard is independent; callers pick a shard
/// index (via whatever pinning policy they like — `tsdb-storage` pins one
/// per session) and always append through that same index.
pub struct InputLog {
    shards: Vec<Shard>,
}

impl InputLog {
    /// Opens (or creates) `config.num_shards` shards. Callers that need
    /// crash recovery must call [`scan`] and [`repair`] on `config` before
    /// this, since recovery reads raw segment files that a freshly opened
    /// shard would otherwise start appending after.
    pub fn open(config: &WalConfig) -> Result<Self, WalError> {
        let mut shards = Vec::with_capacity(config.num_shards);
        for index in 0..config.num_shards {
            shards.push(Shard::open(config, index)?);
        }
        Ok(InputLog { shards })
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn append(&self, shard_index: usize, record: &InputRecord) -> Result<(), WalError> {
        self.shards
            .get(shard_index)
            .ok_or(WalError::BadShard(shard_index))?
            .append(record)
    }

    pub fn set_watermark(&self, shard_index: usize, seq: u64) {
        if let Some(shard) = self.shards.get(shard_index) {
            shard.set_watermark(seq);
        }
    }

    /// Deletes segments below each shard's watermark; called periodically
    /// by the storage facade's sync worker.
    pub fn reclaim_all(&self) -> usize {
        self.shards.iter().map(|s| s.reclaim().unwrap_or(0)).sum()
    }

    pub fn durable_seq(&self, shard_index: usize) -> Option<u64> {
        self.shards.get(shard_index).map(|s| s.durable_seq())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_then_append_then_recover() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig::new(dir.path(), 3);

        {
            let log = InputLog::open(&config).unwrap();
            log.append(
                0,
                &InputRecord::SeriesDecl {
                    id: 1,
                    canonical_name: "cpu host=a".into(),
                },
            )
            .unwrap();
            log.append(
                0,
                &InputRecord::Write {
                    id: 1,
                    timestamp: 10,
                    value: 1.0,
                },
            )
            .unwrap();
        }

        let result = scan(&config).unwrap();
        assert_eq!(result.writes, vec![(1, 10, 1.0)]);
    }

    #[test]
    fn bad_shard_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig::new(dir.path(), 1);
        let log = InputLog::open(&config).unwrap();
        let err = log.append(
            5,
            &InputRecord::Write {
                id: 1,
                timestamp: 1,
                value: 1.0,
            },
        );
        assert!(matches!(err, Err(WalError::BadShard(5))));
    }
}
