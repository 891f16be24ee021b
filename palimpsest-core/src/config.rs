//! # Configuration
//!
//! Tunables of the history engine. Every field has a default, so a partial (or empty) settings file is valid.

use std::path::PathBuf;

/// When a layer's history is compacted into a spilled snapshot.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(default)]
pub struct SpillPolicy {
    /// Spill once a layer's executed log holds more than this many entries.
    pub max_commands: usize,
    /// Spill once the executed commands of one layer hold more than this many bytes.
    pub max_bytes: usize,
    /// After a failed spill, wait this many new commands before trying again.
    pub retry_after: usize,
}
impl Default for SpillPolicy {
    fn default() -> Self {
        Self {
            max_commands: 64,
            max_bytes: 64 * 1024 * 1024,
            retry_after: 16,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(default)]
pub struct HistoryConfig {
    /// Canvas width, shared by every layer.
    pub width: u32,
    pub height: u32,
    pub spill: SpillPolicy,
    /// Where spilled bitmaps are written. `None` picks a per-user cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spill_dir: Option<PathBuf>,
}
impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            spill: SpillPolicy::default(),
            spill_dir: None,
        }
    }
}
impl HistoryConfig {
    /// The configured spill directory, or the default if none is set.
    #[must_use]
    pub fn spill_dir(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(default_spill_dir)
    }
}

/// `<cache>/palimpsest/spill`, or a directory in the system temp dir if there is no cache dir.
#[must_use]
pub fn default_spill_dir() -> PathBuf {
    let mut dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    dir.push("palimpsest");
    dir.push("spill");
    dir
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn defaults() {
        let config = HistoryConfig::default();
        assert_eq!(config.spill.max_commands, 64);
        assert_eq!(config.spill.max_bytes, 64 * 1024 * 1024);
        assert!(config.spill_dir().ends_with("palimpsest/spill"));
    }
    #[test]
    fn explicit_dir() {
        let config = HistoryConfig {
            spill_dir: Some("/somewhere/else".into()),
            ..Default::default()
        };
        assert_eq!(config.spill_dir(), PathBuf::from("/somewhere/else"));
    }
}
