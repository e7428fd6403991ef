//! Target fingerprinting for incremental builds.
//!
//! A fingerprint captures everything a target's step depends on: the tool
//! kind, the exact command line and the content of every actual input.
//! Content hashes (not timestamps) mean a stage whose input was rebuilt to
//! identical bytes stays fresh.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::fs::write_string;
use crate::util::hash::{sha256_file, Fingerprint as HashFingerprint};

/// Hash recorded for an input that does not exist.
const MISSING: &str = "<missing>";

/// Fingerprint for one target step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFingerprint {
    /// Tool kind
    pub tool: String,

    /// Hash of the rendered command line
    pub command_hash: String,

    /// Input content hashes
    pub input_hashes: BTreeMap<PathBuf, String>,
}

impl TargetFingerprint {
    /// Fingerprint a step about to run.
    pub fn for_step(tool: &str, command: &str, inputs: &[PathBuf]) -> Result<Self> {
        let mut fp = HashFingerprint::new();
        fp.update_strs([tool, command]);
        let command_hash = fp.finish_short();

        let mut input_hashes = BTreeMap::new();
        for input in inputs {
            let hash = if input.is_file() {
                sha256_file(input)?
            } else {
                MISSING.to_string()
            };
            input_hashes.insert(input.clone(), hash);
        }

        Ok(TargetFingerprint {
            tool: tool.to_string(),
            command_hash,
            input_hashes,
        })
    }
}

/// Persisted fingerprints of every target built in an output directory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FingerprintCache {
    /// Fingerprints by target name
    pub targets: BTreeMap<String, TargetFingerprint>,
}

impl FingerprintCache {
    /// Load fingerprint cache from a file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(FingerprintCache::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fingerprints: {}", path.display()))?;
        let cache: FingerprintCache = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse fingerprints: {}", path.display()))?;
        Ok(cache)
    }

    /// Load the cache, starting over if it is unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("discarding fingerprint cache: {:#}", e);
            FingerprintCache::default()
        })
    }

    /// Save fingerprint cache to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_string(path, &content)
            .with_context(|| format!("failed to save fingerprints to {}", path.display()))
    }

    /// Check whether a target's recorded fingerprint matches.
    pub fn is_fresh(&self, target: &str, current: &TargetFingerprint) -> bool {
        self.targets.get(target) == Some(current)
    }

    /// Record a target's fingerprint after a successful run.
    pub fn update(&mut self, target: impl Into<String>, fingerprint: TargetFingerprint) {
        self.targets.insert(target.into(), fingerprint);
    }

    /// Forget a target, forcing it to run next time.
    pub fn remove(&mut self, target: &str) {
        self.targets.remove(target);
    }
}
