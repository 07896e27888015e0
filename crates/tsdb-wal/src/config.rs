use std::path::PathBuf;

/// Tuning knobs for the input log. Defaults favor correctness over
/// throughput; callers sizing a production shard count should scale
/// `channel_capacity` with expected writer concurrency.
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub base_dir: PathBuf,
    pub num_shards: usize,
    /// In-memory buffer size (bytes) that triggers a rotation to the fsync
    /// worker.
    pub rotate_threshold: usize,
    /// Buffer size (bytes) at which `append` refuses more writes with
    /// `WouldStall` because rotation can't keep up.
    pub hard_cap: usize,
    /// On-disk segment size (bytes) that triggers closing the segment and
    /// opening the next one.
    pub segment_max_bytes: u64,
    /// Number of in-flight buffers the fsync worker may queue.
    pub channel_capacity: usize,
}

impl WalConfig {
    pub fn new(base_dir: impl Into<PathBuf>, num_shards: usize) -> Self {
        WalConfig {
            base_dir: base_dir.into(),
            num_shards,
            rotate_threshold: 64 * 1024,
            hard_cap: 256 * 1024,
            segment_max_bytes: 64 * 1024 * 1024,
            channel_capacity: 4,
        }
    }

    pub fn shard_dir(&self, index: usize) -> PathBuf {
        self.base_dir.join(format!("shard-{index}"))
    }
}
