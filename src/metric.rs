use crate::LError;
use prometheus::{IntCounter, Registry};

#[derive(Clone)]
pub struct TableCacheMetrics {
    registry: Registry,
    pub(crate) table_cache_hits: IntCounter,
    pub(crate) table_cache_misses: IntCounter,
    pub(crate) file_opens: IntCounter,
    pub(crate) legacy_file_opens: IntCounter,
    pub(crate) file_open_failures: IntCounter,
    pub(crate) table_opens: IntCounter,
    pub(crate) table_open_failures: IntCounter,
    pub(crate) table_evictions: IntCounter,
    pub(crate) file_evictions: IntCounter,
}

/// Point-in-time copy of the table cache counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TableCacheStats {
    pub table_cache_hits: u64,
    pub table_cache_misses: u64,
    pub file_opens: u64,
    pub legacy_file_opens: u64,
    pub file_open_failures: u64,
    pub table_opens: u64,
    pub table_open_failures: u64,
    pub table_evictions: u64,
    pub file_evictions: u64,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, LError> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl TableCacheMetrics {
    pub fn new() -> Result<Self, LError> {
        let r = Registry::new();
        Ok(Self {
            table_cache_hits: counter(&r, "table_cache_hits", "table reader cache hits")?,
            table_cache_misses: counter(&r, "table_cache_misses", "table reader cache misses")?,
            file_opens: counter(&r, "table_file_opens", "table files opened")?,
            legacy_file_opens: counter(
                &r,
                "table_legacy_file_opens",
                "table files opened under their legacy name",
            )?,
            file_open_failures: counter(&r, "table_file_open_failures", "failed table file opens")?,
            table_opens: counter(&r, "table_opens", "table segments parsed")?,
            table_open_failures: counter(&r, "table_open_failures", "failed table segment parses")?,
            table_evictions: counter(&r, "table_evictions", "explicit table reader evictions")?,
            file_evictions: counter(&r, "table_file_evictions", "explicit file handle evictions")?,
            registry: r,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> TableCacheStats {
        TableCacheStats {
            table_cache_hits: self.table_cache_hits.get(),
            table_cache_misses: self.table_cache_misses.get(),
            file_opens: self.file_opens.get(),
            legacy_file_opens: self.legacy_file_opens.get(),
            file_open_failures: self.file_open_failures.get(),
            table_opens: self.table_opens.get(),
            table_open_failures: self.table_open_failures.get(),
            table_evictions: self.table_evictions.get(),
            file_evictions: self.file_evictions.get(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::metric::TableCacheMetrics;

    #[test]
    fn test_metrics_are_per_instance() {
        let m1 = TableCacheMetrics::new().unwrap();
        let m2 = TableCacheMetrics::new().unwrap();
        m1.file_opens.inc();
        m1.table_cache_hits.inc_by(3);
        assert_eq!(m1.stats().file_opens, 1);
        assert_eq!(m1.stats().table_cache_hits, 3);
        assert_eq!(m2.stats().file_opens, 0);
        let families = m1.registry().gather();
        assert_eq!(families.len(), 9);
        assert!(families.iter().any(|f| f.get_name() == "table_file_opens"));
    }
}
