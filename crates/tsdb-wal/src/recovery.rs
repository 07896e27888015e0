use std::collections::{HashMap, HashSet};
use std::fs;

use tsdb_proto::{InputRecord, ParamId, Timestamp};

use crate::codec::{self, Decoded};
use crate::config::WalConfig;
use crate::error::WalError;
use crate::segment::{list_segments, segment_path};

/// Non-fatal anomalies surfaced by a recovery scan (spec.md §7: "Recovery
/// reports non-fatal anomalies ... in a machine-readable report and
/// proceeds").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub series_declared: usize,
    pub writes_recovered: usize,
    pub writes_dropped_undeclared: usize,
    pub torn_segments: usize,
    pub collisions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryResult {
    /// `SeriesDecl`s replayed into the name registry, idempotent by id.
    pub series: Vec<(ParamId, String)>,
    /// Final `(id, timestamp, value)` writes, collision-resolved with
    /// "later in shard order wins" and sorted by `(id, timestamp)`.
    pub writes: Vec<(ParamId, Timestamp, f64)>,
    pub report: RecoveryReport,
    /// `(shard_index, segment_seq, valid_len)` for segments whose tail was
    /// torn — pass to [`repair`] to truncate them on disk.
    pub torn: Vec<(usize, u64, usize)>,
}

/// Scans every shard directory under `config.base_dir`, replaying
/// `SeriesDecl`s first and then `Write`s, per spec.md §4.2's recovery
/// contract. Shards are visited in a fixed index order (0..num_shards),
/// which is what "later in shard order" means for collision resolution.
/// Does not mutate anything on disk — call [`repair`] afterward to
/// truncate torn tails.
pub fn scan(config: &WalConfig) -> Result<RecoveryResult, WalError> {
    let mut report = RecoveryReport::default();
    let mut per_shard_records: Vec<Vec<InputRecord>> = Vec::with_capacity(config.num_shards);
    let mut torn = Vec::new();

    for index in 0..config.num_shards {
        let dir = config.shard_dir(index);
        let mut records = Vec::new();
        for seq in list_segments(&dir)? {
            let bytes = fs::read(segment_path(&dir, seq))?;
            let mut offset = 0usize;
            loop {
                match codec::decode_one(&bytes[offset..]) {
                    Decoded::Record(record, consumed) => {
                        records.push(record);
                        offset += consumed;
                    }
                    Decoded::Incomplete => {
                        if offset < bytes.len() {
                            report.torn_segments += 1;
                            torn.push((index, seq, offset));
                        }
                        break;
                    }
                    Decoded::Corrupt(_consumed) => {
                        report.torn_segments += 1;
                        torn.push((index, seq, offset));
                        break;
                    }
                }
            }
        }
        per_shard_records.push(records);
    }

    let mut series: Vec<(ParamId, String)> = Vec::new();
    let mut declared: HashSet<ParamId> = HashSet::new();
    for records in &per_shard_records {
        for record in records {
            if let InputRecord::SeriesDecl { id, canonical_name } = record {
                if declared.insert(*id) {
                    series.push((*id, canonical_name.clone()));
                    report.series_declared += 1;
                }
            }
        }
    }

    // `GlobalDictionary::load_snapshot` requires ascending, gap-free ids —
    // shard-scan order reflects append order, not allocation order, so a
    // series declared in an earlier-scanned shard can carry a higher id
    // than one declared in a later-scanned shard.
    series.sort_unstable_by_key(|(id, _)| *id);

    let mut writes: HashMap<(ParamId, Timestamp), f64> = HashMap::new();
    for records in &per_shard_records {
        for record in records {
            if let InputRecord::Write {
                id,
                timestamp,
                value,
            } = record
            {
                if !declared.contains(id) {
                    report.writes_dropped_undeclared += 1;
                    continue;
                }
                let key = (*id, *timestamp);
                if writes.contains_key(&key) {
                    report.collisions += 1;
                }
                writes.insert(key, *value);
                report.writes_recovered += 1;
            }
        }
    }

    let mut writes: Vec<(ParamId, Timestamp, f64)> =
        writes.into_iter().map(|((id, ts), v)| (id, ts, v)).collect();
    writes.sort_unstable_by_key(|(id, ts, _)| (*id, *ts));

    Ok(RecoveryResult {
        series,
        writes,
        report,
        torn,
    })
}

/// Truncates each torn segment named in `result.torn` to its last valid
/// record boundary. Call once, before any shard starts appending, so a
/// fresh append lands immediately after the last good record rather than
/// after a torn tail.
pub fn repair(config: &WalConfig, result: &RecoveryResult) -> std::io::Result<()> {
    for &(shard_index, seq, valid_len) in &result.torn {
        let path = segment_path(&config.shard_dir(shard_index), seq);
        let file = std::fs::OpenOptions::new().write(true).open(&path)?;
        file.set_len(valid_len as u64)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::Shard;

    #[test]
    fn replays_series_then_writes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig::new(dir.path(), 2);

        {
            let shard0 = Shard::open(&config, 0).unwrap();
            shard0
                .append(&InputRecord::SeriesDecl {
                    id: 1,
                    canonical_name: "cpu host=a".into(),
                })
                .unwrap();
            shard0
                .append(&InputRecord::Write {
                    id: 1,
                    timestamp: 10,
                    value: 1.0,
                })
                .unwrap();
        }

        let result = scan(&config).unwrap();
        assert_eq!(result.series, vec![(1, "cpu host=a".to_string())]);
        assert_eq!(result.writes, vec![(1, 10, 1.0)]);
        assert_eq!(result.report.writes_dropped_undeclared, 0);
    }

    #[test]
    fn series_are_sorted_by_id_regardless_of_shard_scan_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig::new(dir.path(), 2);
        {
            // Shard 0 is scanned first but declares the higher id; shard 1
            // declares the lower one. The result must still come back in
            // ascending id order so `GlobalDictionary::load_snapshot`'s
            // contiguity requirement holds.
            let shard0 = Shard::open(&config, 0).unwrap();
            shard0
                .append(&InputRecord::SeriesDecl {
                    id: 1,
                    canonical_name: "mem host=a".into(),
                })
                .unwrap();
            let shard1 = Shard::open(&config, 1).unwrap();
            shard1
                .append(&InputRecord::SeriesDecl {
                    id: 0,
                    canonical_name: "cpu host=a".into(),
                })
                .unwrap();
        }

        let result = scan(&config).unwrap();
        assert_eq!(
            result.series,
            vec![(0, "cpu host=a".to_string()), (1, "mem host=a".to_string())]
        );
    }

    #[test]
    fn drops_writes_for_undeclared_series() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig::new(dir.path(), 1);
        {
            let shard0 = Shard::open(&config, 0).unwrap();
            shard0
                .append(&InputRecord::Write {
                    id: 99,
                    timestamp: 1,
                    value: 1.0,
                })
                .unwrap();
        }
        let result = scan(&config).unwrap();
        assert!(result.writes.is_empty());
        assert_eq!(result.report.writes_dropped_undeclared, 1);
    }

    #[test]
    fn collision_across_shards_later_shard_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig::new(dir.path(), 2);
        {
            let shard0 = Shard::open(&config, 0).unwrap();
            shard0
                .append(&InputRecord::SeriesDecl {
                    id: 1,
                    canonical_name: "cpu host=a".into(),
                })
                .unwrap();
            shard0
                .append(&InputRecord::Write {
                    id: 1,
                    timestamp: 5,
                    value: 1.0,
                })
                .unwrap();

            let shard1 = Shard::open(&config, 1).unwrap();
            shard1
                .append(&InputRecord::Write {
                    id: 1,
                    timestamp: 5,
                    value: 2.0,
                })
                .unwrap();
        }
        let result = scan(&config).unwrap();
        assert_eq!(result.writes, vec![(1, 5, 2.0)]);
        assert_eq!(result.report.collisions, 1);
    }
}
