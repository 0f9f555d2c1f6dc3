//! Engine configuration

/// Configuration for a [`crate::GroupStore`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How many entries each backing `get_range` call fetches while a
    /// cursor pages through a group tree.
    pub scan_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: 256,
        }
    }
}

impl StoreConfig {
    /// Create config optimized for testing: a tiny batch size so scans
    /// exercise paging even over small fixtures.
    pub fn for_testing() -> Self {
        Self { scan_batch_size: 3 }
    }
}
