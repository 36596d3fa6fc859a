//! The table reader capability the cache is built on. The on-disk block
//! format lives with the implementors; this crate only needs to open a
//! segment, scan it and run point lookups against it.

use crate::io::RandomAccessFile;
use crate::iterator::DBScanner;
use crate::key::InternalKey;
use crate::opts::{Opts, ReadOptions};
use crate::LError;
use bytes::Bytes;
use std::sync::Arc;

/// A parsed, immutable table segment.
pub trait Table: Send + Sync + 'static {
    fn new_scanner(&self, ropts: &ReadOptions) -> Box<dyn DBScanner>;

    /// Looks up `key` (an encoded internal key) and calls `visitor` for the
    /// entry found at or after it, if any. `segment_offset` is the signed
    /// distance from the physical end of the file to the end of this
    /// segment, 0 for whole-file tables.
    fn internal_get(
        &self,
        ropts: &ReadOptions,
        key: &[u8],
        segment_offset: i64,
        visitor: &mut dyn FnMut(&InternalKey, &Bytes),
    ) -> Result<(), LError>;
}

pub trait TableOpener<F: RandomAccessFile>: Send + Sync + 'static {
    type T: Table;

    /// Parses the segment of `file` that ends at byte `limit`. `file_size` is
    /// the size recorded for the file in the manifest.
    fn open(&self, opts: &Opts, file: Arc<F>, file_size: u64, limit: u64) -> Result<Self::T, LError>;
}

/// A minimal segment format for exercising the cache: length-prefixed
/// key/value pairs followed by an 8-byte little-endian footer holding the
/// offset where the segment's data starts.
#[cfg(test)]
pub(crate) mod testutil {
    use crate::io::RandomAccessFile;
    use crate::iterator::{DBScanner, ScanEntry};
    use crate::key::{InternalKey, InternalKeyComparator, InternalKeyRef};
    use crate::compare::BYTEWISE_COMPARATOR;
    use crate::opts::{Opts, ReadOptions};
    use crate::table::{Table, TableOpener};
    use crate::utils::varint::{put_length_prefixed, take_length_prefixed};
    use crate::LError;
    use bytes::{BufMut, Bytes, BytesMut};
    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::time::Duration;

    const FOOTER_LEN: u64 = 8;

    /// Appends one segment to `buf` and returns its end offset.
    pub(crate) fn write_segment(buf: &mut BytesMut, entries: &[ScanEntry]) -> u64 {
        let start = buf.len() as u64;
        for (k, v) in entries {
            put_length_prefixed(buf, k.as_ref());
            put_length_prefixed(buf, v.as_ref());
        }
        buf.put_u64_le(start);
        buf.len() as u64
    }

    pub(crate) fn kv(k: &str, seq: u64, v: &str) -> ScanEntry {
        (
            InternalKeyRef::from((k.as_bytes(), seq)).to_owned(),
            Bytes::from(v.to_string()),
        )
    }

    pub(crate) struct VecTable {
        entries: Arc<Vec<ScanEntry>>,
        pub(crate) last_segment_offset: AtomicI64,
    }

    fn seek_pos(entries: &[ScanEntry], target: &[u8]) -> Result<usize, LError> {
        let icmp = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
        let target = InternalKeyRef::parse(target)?;
        Ok(entries
            .iter()
            .position(|(k, _)| icmp.compare_keyref(&k.borrow(), &target) != Ordering::Less)
            .unwrap_or(entries.len()))
    }

    impl Table for VecTable {
        fn new_scanner(&self, _ropts: &ReadOptions) -> Box<dyn DBScanner> {
            Box::new(VecTableScanner {
                entries: self.entries.clone(),
                pos: 0,
            })
        }

        fn internal_get(
            &self,
            _ropts: &ReadOptions,
            key: &[u8],
            segment_offset: i64,
            visitor: &mut dyn FnMut(&InternalKey, &Bytes),
        ) -> Result<(), LError> {
            self.last_segment_offset
                .store(segment_offset, AtomicOrdering::SeqCst);
            let pos = seek_pos(&self.entries, key)?;
            if let Some((k, v)) = self.entries.get(pos) {
                visitor(k, v);
            }
            Ok(())
        }
    }

    pub(crate) struct VecTableScanner {
        entries: Arc<Vec<ScanEntry>>,
        pos: usize,
    }

    impl DBScanner for VecTableScanner {
        fn seek(&mut self, target: &[u8]) -> Result<(), LError> {
            self.pos = seek_pos(&self.entries, target)?;
            Ok(())
        }

        fn next(&mut self) -> Result<Option<ScanEntry>, LError> {
            let e = self.entries.get(self.pos).cloned();
            if e.is_some() {
                self.pos += 1;
            }
            Ok(e)
        }
    }

    #[derive(Default)]
    pub(crate) struct VecTableOpener {
        pub(crate) parses: AtomicUsize,
        pub(crate) delay: Option<Duration>,
    }

    impl VecTableOpener {
        pub(crate) fn parses(&self) -> usize {
            self.parses.load(AtomicOrdering::SeqCst)
        }
    }

    impl<F: RandomAccessFile> TableOpener<F> for VecTableOpener {
        type T = VecTable;

        fn open(&self, _opts: &Opts, file: Arc<F>, file_size: u64, limit: u64) -> Result<VecTable, LError> {
            self.parses.fetch_add(1, AtomicOrdering::SeqCst);
            if let Some(d) = self.delay {
                std::thread::sleep(d);
            }
            if limit > file_size || limit < FOOTER_LEN || file.size()? < limit {
                return Err(LError::InvalidFile(format!(
                    "segment limit {} outside file of {} bytes",
                    limit, file_size
                )));
            }
            let mut footer = [0u8; FOOTER_LEN as usize];
            file.read_exact_at(limit - FOOTER_LEN, &mut footer)?;
            let start = u64::from_le_bytes(footer);
            if start > limit - FOOTER_LEN {
                return Err(LError::corruption("segment footer points past its end"));
            }
            let mut data = vec![0u8; (limit - FOOTER_LEN - start) as usize];
            file.read_exact_at(start, &mut data)?;
            let mut data = Bytes::from(data);
            let mut entries = vec![];
            while !data.is_empty() {
                let k = take_length_prefixed(&mut data, "key")?;
                let v = take_length_prefixed(&mut data, "value")?;
                entries.push((InternalKey::try_from(k)?, v));
            }
            Ok(VecTable {
                entries: Arc::new(entries),
                last_segment_offset: AtomicI64::new(0),
            })
        }
    }
}
