//! Content-addressable cache for lint results
//!
//! Uses BLAKE3 hashing to create cache keys based on:
//! - File path
//! - File contents
//! - Enabled lint rules and permitted globals
//!
//! An unchanged file linted with unchanged rules is never tokenized twice.

use std::path::{Path, PathBuf};

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::config::JshintConfig;
use crate::error::{GristError, Result};
use crate::lint::Violation;

/// Cache entry metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hash of the cache key
    pub key: String,
    /// Linted file, relative to the project root
    pub file: PathBuf,
    /// Timestamp of creation
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Number of violations stored
    pub violations: usize,
}

/// Lint result cache
#[derive(Debug, Clone)]
pub struct Cache {
    /// Cache directory
    dir: PathBuf,
}

impl Cache {
    /// Create a new cache instance
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        let dir = dir.unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "grist")
                .map(|d| d.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".grist/cache"))
        });

        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    /// Get cached violations for a file if its content and rules are unchanged
    pub async fn get(
        &self,
        file: &Path,
        content: &str,
        jshint: &JshintConfig,
    ) -> Result<Option<Vec<Violation>>> {
        let key = Self::compute_key(file, content, jshint);
        let cache_path = self.cache_path(&key);
        let meta_path = self.meta_path(&key);

        if !cache_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let meta_content = tokio::fs::read_to_string(&meta_path).await?;
        let entry: CacheEntry = serde_json::from_str(&meta_content).map_err(|_| GristError::Cache {
            message: "Invalid cache metadata".to_string(),
        })?;

        // Verify the entry is for this file
        if entry.file != file {
            return Ok(None);
        }

        let output = tokio::fs::read_to_string(&cache_path).await?;
        let violations = serde_json::from_str(&output).map_err(|e| GristError::Cache {
            message: format!("Invalid cache entry {}: {}", key, e),
        })?;

        Ok(Some(violations))
    }

    /// Store lint results in cache
    pub async fn put(
        &self,
        file: &Path,
        content: &str,
        jshint: &JshintConfig,
        violations: &[Violation],
    ) -> Result<()> {
        let key = Self::compute_key(file, content, jshint);

        let output = serde_json::to_string(violations).map_err(|e| GristError::Cache {
            message: format!("Failed to serialize lint results: {}", e),
        })?;
        tokio::fs::write(self.cache_path(&key), output).await?;

        let entry = CacheEntry {
            key: key.clone(),
            file: file.to_path_buf(),
            created_at: chrono::Utc::now(),
            violations: violations.len(),
        };

        let meta_content = serde_json::to_string_pretty(&entry).map_err(|e| GristError::Cache {
            message: format!("Failed to serialize cache metadata: {}", e),
        })?;

        tokio::fs::write(self.meta_path(&key), meta_content).await?;

        Ok(())
    }

    /// Clear entire cache
    pub async fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            tokio::fs::remove_dir_all(&self.dir).await?;
            tokio::fs::create_dir_all(&self.dir).await?;
        }

        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let mut total_size = 0u64;
        let mut entry_count = 0usize;

        for entry in walkdir::WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().map(|e| e == "cache").unwrap_or(false) {
                total_size += entry.metadata().map(|m| m.len()).unwrap_or(0);
                entry_count += 1;
            }
        }

        Ok(CacheStats {
            entries: entry_count,
            total_size,
            cache_dir: self.dir.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compute cache key for a file
    fn compute_key(file: &Path, content: &str, jshint: &JshintConfig) -> String {
        let mut hasher = Hasher::new();

        hasher.update(file.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(content.as_bytes());
        hasher.update(&[0]);
        hasher.update(jshint.options.fingerprint().as_bytes());

        // BTreeMap iterates sorted
        for (name, writable) in &jshint.globals {
            hasher.update(name.as_bytes());
            hasher.update(if *writable { b"+" } else { b"-" });
        }

        let hash = hasher.finalize();
        hash.to_hex()[..16].to_string()
    }

    /// Get path for cache file
    fn cache_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.cache", key))
    }

    /// Get path for metadata file
    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.meta.json", key))
    }
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub cache_dir: PathBuf,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        };

        write!(
            f,
            "{} entries, {} total ({})",
            self.entries,
            size_str,
            self.cache_dir.display()
        )
    }
}
