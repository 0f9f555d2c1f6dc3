//! Store configuration

use fjall::{CompressionType, PersistMode};
use std::path::PathBuf;

/// Configuration for a [`crate::TransactStore`]
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Base directory for storage files
    pub data_dir: PathBuf,

    /// Fjall block cache size in bytes
    pub block_cache_size: u64,

    /// Compression type for data
    pub compression: CompressionType,

    /// Persistence mode for commits
    pub persist_mode: PersistMode,
}

impl Default for KvConfig {
    fn default() -> Self {
        // Use tempfile to create a proper temporary directory
        // Using .keep() to persist the directory (won't be auto-deleted)
        let temp_dir = tempfile::tempdir()
            .expect("Failed to create temporary directory")
            .keep();

        Self {
            data_dir: temp_dir,
            block_cache_size: 64 * 1024 * 1024, // 64 MB
            compression: CompressionType::Lz4,
            persist_mode: PersistMode::Buffer,
        }
    }
}

impl KvConfig {
    /// Create a new config with the given data directory
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Config for tests: a throwaway directory and buffered persistence.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Set block cache size
    pub fn with_block_cache_size(mut self, size: u64) -> Self {
        self.block_cache_size = size;
        self
    }

    /// Set compression type
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Set persist mode
    pub fn with_persist_mode(mut self, mode: PersistMode) -> Self {
        self.persist_mode = mode;
        self
    }
}
