use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`PackedDb`](crate::PackedDb).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackedDbConfig {
    /// Re-sort packs by hit count every this many successful lookups.
    /// `0` disables re-sorting on lookup; refreshes still sort.
    pub sort_interval: u64,
    /// Memory-map index and pack files instead of reading them into memory.
    pub allow_mmap: bool,
}

impl Default for PackedDbConfig {
    fn default() -> Self {
        Self {
            sort_interval: 500,
            allow_mmap: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PackedDbConfig::default();
        assert_eq!(config.sort_interval, 500);
        assert!(config.allow_mmap);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PackedDbConfig = serde_json::from_str(r#"{"allow_mmap": false}"#).unwrap();
        assert_eq!(config.sort_interval, 500);
        assert!(!config.allow_mmap);
    }
}
