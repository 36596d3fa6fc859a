use crate::compare::{ComparatorImpl, BYTEWISE_COMPARATOR};
use crate::key::InternalKeyComparator;
use std::sync::Arc;

/// Descriptors kept open outside the table cache: log, manifest, lock and
/// a few spare.
const NON_TABLE_CACHE_FILES: usize = 10;

pub type Opts = Arc<OptsRaw>;

#[derive(Debug)]
pub struct OptsRaw {
    pub comparer: ComparatorImpl,
    pub paranoid_checks: bool,
    pub verify_checksum: bool,
    pub max_open_files: usize,
    pub table_cache_ratio: usize,
    pub cache_shard_bits: usize,
}

pub fn default_opts() -> Opts {
    Arc::new(OptsRaw::default())
}

impl Default for OptsRaw {
    fn default() -> Self {
        Self {
            comparer: BYTEWISE_COMPARATOR,
            paranoid_checks: false,
            verify_checksum: true,
            max_open_files: 1000,
            table_cache_ratio: 64,
            cache_shard_bits: 4,
        }
    }
}

impl OptsRaw {
    pub fn get_ucmp(&self) -> ComparatorImpl {
        self.comparer
    }

    pub fn get_icmp(&self) -> InternalKeyComparator {
        InternalKeyComparator::from(self.comparer)
    }

    pub fn get_paranoid_checks(&self) -> bool {
        self.paranoid_checks
    }

    pub fn get_verify_checksum(&self) -> bool {
        self.verify_checksum
    }

    /// Number of physical files the table cache may keep open.
    pub fn get_table_cache_entries(&self) -> usize {
        if self.max_open_files <= NON_TABLE_CACHE_FILES {
            1
        } else {
            self.max_open_files - NON_TABLE_CACHE_FILES
        }
    }

    pub fn get_table_cache_ratio(&self) -> usize {
        if self.table_cache_ratio == 0 {
            64
        } else {
            self.table_cache_ratio
        }
    }

    pub fn get_cache_shard_bits(&self) -> usize {
        self.cache_shard_bits.min(8)
    }
}

#[derive(Clone, Debug)]
pub struct ReadOptions {
    verify_checksum: bool,
    fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            verify_checksum: true,
            fill_cache: true,
        }
    }
}

impl ReadOptions {
    pub fn set_verify_checksum(&mut self, v: bool) {
        self.verify_checksum = v;
    }

    pub fn set_fill_cache(&mut self, v: bool) {
        self.fill_cache = v;
    }

    pub fn verify_checksum(&self) -> bool {
        self.verify_checksum
    }

    pub fn fill_cache(&self) -> bool {
        self.fill_cache
    }
}
