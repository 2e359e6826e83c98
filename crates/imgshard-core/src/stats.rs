//! Shard statistics and the bounded-cardinality status counter (§3, §9).

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

/// Frequency map over error messages / status keywords, capped to `cap`
/// distinct keys with an overflow bucket (§9 "bounded-cardinality status
/// counter" — new code; the teacher has no direct counterpart, but
/// follows its preference for `rustc_hash::FxHashMap`-style fast maps
/// over `std::collections::HashMap` where cardinality can be adversarial).
#[derive(Debug, Clone)]
pub struct CappedStatusCounter {
    cap: usize,
    counts: rustc_hash::FxHashMap<String, u64>,
    overflow: u64,
}

impl CappedStatusCounter {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            counts: rustc_hash::FxHashMap::default(),
            overflow: 0,
        }
    }

    /// Record one occurrence of `key`. Once `cap` distinct keys are
    /// tracked, further unseen keys are folded into the overflow bucket
    /// instead of growing the map.
    pub fn record(&mut self, key: &str) {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
            return;
        }
        if self.counts.len() < self.cap {
            self.counts.insert(key.to_string(), 1);
        } else {
            self.overflow += 1;
        }
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Snapshot as a plain map for serialization, with the overflow
    /// bucket under a reserved key if non-zero.
    pub fn to_map(&self) -> HashMap<String, u64> {
        let mut map: HashMap<String, u64> = self
            .counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        if self.overflow > 0 {
            map.insert("__overflow__".to_string(), self.overflow);
        }
        map
    }
}

/// Per-shard statistics (§3 `ShardStats`).
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub shard_id: u64,
    pub count: u64,
    pub successes: u64,
    pub failed_to_download: u64,
    pub failed_to_resize: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub status_counter: HashMap<String, u64>,
}

/// §6 "Stats file": `(output_folder, shard_id, count, successes,
/// failed_to_download, failed_to_resize, start_time, end_time,
/// status_counter, q)` emitted via an external sink.
pub trait StatsSink {
    fn write(&self, stats: &ShardStats) -> std::io::Result<()>;
}

/// Writes stats as JSON beside the shard output — `serde_json` is the
/// pervasive sidecar-metadata format across the corpus.
pub struct JsonStatsSink {
    output_folder: PathBuf,
}

impl JsonStatsSink {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
        }
    }

    fn path_for(&self, shard_id: u64) -> PathBuf {
        self.output_folder.join(format!("{shard_id:05}_stats.json"))
    }
}

impl StatsSink for JsonStatsSink {
    fn write(&self, stats: &ShardStats) -> std::io::Result<()> {
        let path = self.path_for(stats.shard_id);
        let tmp_path: PathBuf = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(stats).map_err(std::io::Error::other)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&body)?;
        }
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn counter_caps_distinct_keys() {
        let mut counter = CappedStatusCounter::new(2);
        counter.record("a");
        counter.record("b");
        counter.record("c");
        counter.record("a");
        assert_eq!(counter.len(), 2);
        assert_eq!(counter.get("a"), 2);
        assert_eq!(counter.overflow(), 1);
    }

    #[test]
    fn counter_repeated_known_key_does_not_grow_overflow() {
        let mut counter = CappedStatusCounter::new(1);
        counter.record("a");
        counter.record("a");
        counter.record("a");
        assert_eq!(counter.get("a"), 3);
        assert_eq!(counter.overflow(), 0);
    }

    #[test]
    fn to_map_includes_overflow_bucket() {
        let mut counter = CappedStatusCounter::new(1);
        counter.record("a");
        counter.record("b");
        let map = counter.to_map();
        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(map.get("__overflow__"), Some(&1));
    }

    #[test]
    fn json_stats_sink_round_trip() {
        let dir = TempDir::new().unwrap();
        let sink = JsonStatsSink::new(dir.path());
        let stats = ShardStats {
            shard_id: 3,
            count: 10,
            successes: 8,
            failed_to_download: 1,
            failed_to_resize: 1,
            start_time: 100,
            end_time: 200,
            status_counter: HashMap::new(),
        };
        sink.write(&stats).unwrap();

        let path = dir.path().join("00003_stats.json");
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"count\": 10"));
    }

    #[test]
    fn json_stats_sink_no_stray_tmp_file() {
        let dir = TempDir::new().unwrap();
        let sink = JsonStatsSink::new(dir.path());
        let stats = ShardStats {
            shard_id: 1,
            count: 1,
            successes: 1,
            failed_to_download: 0,
            failed_to_resize: 0,
            start_time: 0,
            end_time: 1,
            status_counter: HashMap::new(),
        };
        sink.write(&stats).unwrap();
        assert!(!dir.path().join("00001_stats.json.tmp").exists());
    }
}
