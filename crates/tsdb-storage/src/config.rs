use std::path::{Path, PathBuf};
use std::time::Duration;

use tsdb_wal::WalConfig;

/// Tuning knobs for a [`crate::Storage::open`] call. Mirrors the teacher's
/// convention of a single `serde`-deserializable config struct rather than
/// scattering constants through the open path.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StorageConfig {
    pub num_volumes: usize,
    pub page_size: usize,
    pub num_shards: usize,
    pub sync_period: Duration,
}

impl StorageConfig {
    pub fn new(num_shards: usize) -> Self {
        StorageConfig {
            num_volumes: 1,
            page_size: 4096,
            num_shards,
            sync_period: Duration::from_secs(1),
        }
    }

    /// `base_dir` is the input log's own root (already `.../wal` for
    /// on-disk databases — see `Storage::open`); this does not append
    /// another `"wal"` segment so callers that hand in a scratch directory
    /// directly (tests, `Storage::open_in_memory`) see exactly the shards
    /// they wrote.
    pub(crate) fn wal_config(&self, base_dir: &Path) -> WalConfig {
        WalConfig::new(base_dir, self.num_shards)
    }

    pub(crate) fn metadata_path(base_dir: &Path) -> PathBuf {
        base_dir.join("meta.json")
    }

    pub(crate) fn columns_path(base_dir: &Path) -> PathBuf {
        base_dir.join("columns.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::new(4)
    }
}
