//! Maps `(file number, file size, end offset)` to an open table reader.
//!
//! Two caches are kept. The file cache is keyed by file number and holds the
//! open file. The table cache is keyed by `(end offset, file number)` and
//! holds a parsed segment together with a handle into the file cache, so
//! every segment of one physical file shares a single open file. That handle
//! is owned by the table entry and goes away exactly when the entry does.

use crate::filename::{legacy_table_file_name, table_file_name};
use crate::io::{RandomAccessFile, StorageSystem};
use crate::iterator::{CleanupScanner, DBScanner, ErrorScanner};
use crate::key::InternalKey;
use crate::metric::{TableCacheMetrics, TableCacheStats};
use crate::opts::{Opts, ReadOptions};
use crate::table::{Table, TableOpener};
use crate::utils::lru::{CacheHandle, LruCache};
use crate::{call_on_drop, LError};
use bytes::Bytes;
use log::{debug, warn};
use prometheus::Registry;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
struct SegmentKey {
    end_offset: Option<u64>,
    number: u64,
}

/// A cached table segment plus its pin on the underlying file.
pub struct TableAndFile<T, F: RandomAccessFile> {
    table: T,
    _file: CacheHandle<Arc<F>>,
}

impl<T, F: RandomAccessFile> TableAndFile<T, F> {
    pub fn table(&self) -> &T {
        &self.table
    }
}

pub type TableHandle<T, F> = CacheHandle<TableAndFile<T, F>>;

pub struct TableCache<E: StorageSystem, O: TableOpener<E::O>> {
    dbname: String,
    opts: Opts,
    env: E,
    opener: O,
    metrics: TableCacheMetrics,
    files: LruCache<u64, Arc<E::O>>,
    tables: LruCache<SegmentKey, TableAndFile<O::T, E::O>>,
}

impl<E: StorageSystem, O: TableOpener<E::O>> TableCache<E, O> {
    /// Keeps up to `opts.get_table_cache_entries()` files open and
    /// `table_cache_ratio` times as many parsed segments.
    pub fn new(dbname: &str, opts: Opts, env: E, opener: O) -> Result<Self, LError> {
        let shard_bits = opts.get_cache_shard_bits();
        let entries = opts.get_table_cache_entries();
        let table_entries = entries.saturating_mul(opts.get_table_cache_ratio());
        Ok(Self {
            dbname: dbname.to_string(),
            files: LruCache::with_shards(entries, shard_bits),
            tables: LruCache::with_shards(table_entries, shard_bits),
            metrics: TableCacheMetrics::new()?,
            opts,
            env,
            opener,
        })
    }

    fn open_file(&self, number: u64) -> Result<Arc<E::O>, LError> {
        let fname = table_file_name(self.dbname.as_str(), number);
        let err = match self.env.open_random_access(fname.as_str()) {
            Ok(f) => {
                self.metrics.file_opens.inc();
                debug!("opened table file {}", fname);
                return Ok(Arc::new(f));
            }
            Err(e) => e,
        };
        let legacy = legacy_table_file_name(self.dbname.as_str(), number);
        warn!("failed to open {}: {}, trying {}", fname, err, legacy);
        match self.env.open_random_access(legacy.as_str()) {
            Ok(f) => {
                self.metrics.file_opens.inc();
                self.metrics.legacy_file_opens.inc();
                debug!("opened legacy table file {}", legacy);
                Ok(Arc::new(f))
            }
            Err(e) => {
                self.metrics.file_open_failures.inc();
                warn!("failed to open {}: {}", legacy, e);
                Err(err)
            }
        }
    }

    fn find_file(&self, number: u64) -> Result<CacheHandle<Arc<E::O>>, LError> {
        self.files
            .get_or_try_insert_with(number, 1, || self.open_file(number))
    }

    /// Returns a handle pinning the parsed segment. Concurrent callers asking
    /// for the same segment share one file open and one parse.
    pub fn find_table(
        &self,
        number: u64,
        file_size: u64,
        end_offset: Option<u64>,
    ) -> Result<TableHandle<O::T, E::O>, LError> {
        let key = SegmentKey { end_offset, number };
        if let Some(h) = self.tables.lookup(&key) {
            self.metrics.table_cache_hits.inc();
            return Ok(h);
        }
        self.metrics.table_cache_misses.inc();
        self.tables.get_or_try_insert_with(key, 1, || {
            let file = self.find_file(number)?;
            let limit = end_offset.unwrap_or(file_size);
            match self
                .opener
                .open(&self.opts, file.value().clone(), file_size, limit)
            {
                Ok(table) => {
                    self.metrics.table_opens.inc();
                    debug!(
                        "parsed table {} size {} limit {}",
                        number, file_size, limit
                    );
                    Ok(TableAndFile { table, _file: file })
                }
                Err(e) => {
                    self.metrics.table_open_failures.inc();
                    warn!("failed to parse table {} limit {}: {}", number, limit, e);
                    Err(e)
                }
            }
        })
    }

    /// Scans one segment. Resolution failures are reported by the returned
    /// scanner on first use. The segment stays pinned until the scanner is
    /// dropped, even if it is evicted meanwhile.
    pub fn new_iterator(
        &self,
        ropts: &ReadOptions,
        number: u64,
        file_size: u64,
        end_offset: Option<u64>,
    ) -> Box<dyn DBScanner> {
        let h = match self.find_table(number, file_size, end_offset) {
            Ok(h) => h,
            Err(e) => return Box::new(ErrorScanner::new(e)),
        };
        let mut scanner = CleanupScanner::new(h.table().new_scanner(ropts));
        scanner.register_cleanup(call_on_drop!({
            h.release();
        }));
        Box::new(scanner)
    }

    /// Point lookup of the encoded internal key `key` in one segment.
    pub fn get(
        &self,
        ropts: &ReadOptions,
        number: u64,
        file_size: u64,
        end_offset: Option<u64>,
        key: &[u8],
        visitor: &mut dyn FnMut(&InternalKey, &Bytes),
    ) -> Result<(), LError> {
        let h = self.find_table(number, file_size, end_offset)?;
        let segment_offset = match end_offset {
            Some(end) => end as i64 - file_size as i64,
            None => 0,
        };
        let r = h.table().internal_get(ropts, key, segment_offset, visitor);
        h.release();
        r
    }

    /// Drops the cached segment. The file stays cached. A parse still in
    /// progress is not affected.
    pub fn evict(&self, number: u64, end_offset: Option<u64>) {
        if self.tables.erase(&SegmentKey { end_offset, number }) {
            self.metrics.table_evictions.inc();
            debug!("evicted table {} end offset {:?}", number, end_offset);
        }
    }

    /// Drops the cached file handle, for files about to be deleted. Segments
    /// still cached keep their own pin on the old handle.
    pub fn evict_file(&self, number: u64) {
        if self.files.erase(&number) {
            self.metrics.file_evictions.inc();
            debug!("evicted table file {}", number);
        }
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn cached_files(&self) -> usize {
        self.files.len()
    }

    pub fn stats(&self) -> TableCacheStats {
        self.metrics.stats()
    }

    pub fn registry(&self) -> &Registry {
        self.metrics.registry()
    }
}
