use crate::key::InternalKey;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};

pub const DEFAULT_ALLOWED_SEEKS: i64 = 1 << 30;

// one seek costs about as much as compacting 16KiB
const BYTES_PER_SEEK: u64 = 16 * 1024;
const MIN_ALLOWED_SEEKS: i64 = 100;

/// No segment can end at `u64::MAX`, so that offset means unbounded.
pub(crate) fn bounded_end(end_offset: Option<u64>) -> Option<u64> {
    end_offset.filter(|&end| end != u64::MAX)
}

/// One logical table segment. Several segments may live in the same
/// physical file, each ending at its own `end_offset`; `None` means the
/// segment runs to the end of the file.
///
/// Ordering and equality only look at `(number, end_offset)`: by number
/// ascending, then by end offset descending, `None` counting as the largest
/// end offset.
pub struct FileMetaData {
    refs: AtomicUsize,
    allowed_seeks: AtomicI64,
    pub number: u64,
    pub file_size: u64,
    pub end_offset: Option<u64>,
    pub smallest: InternalKey,
    pub largest: InternalKey,
}

impl FileMetaData {
    pub fn new(
        number: u64,
        file_size: u64,
        end_offset: Option<u64>,
        smallest: InternalKey,
        largest: InternalKey,
    ) -> Self {
        Self {
            refs: AtomicUsize::new(0),
            allowed_seeks: AtomicI64::new(DEFAULT_ALLOWED_SEEKS),
            number,
            file_size,
            end_offset: bounded_end(end_offset),
            smallest,
            largest,
        }
    }

    /// Byte offset the table reader should treat as the end of the segment.
    pub fn limit(&self) -> u64 {
        self.end_offset.unwrap_or(self.file_size)
    }

    fn end_key(&self) -> u64 {
        self.end_offset.unwrap_or(u64::MAX)
    }

    pub fn refs(&self) -> usize {
        self.refs.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn add_ref(&self) {
        self.refs.fetch_add(1, AtomicOrdering::AcqRel);
    }

    /// Returns the number of references left.
    pub(crate) fn unref(&self) -> usize {
        match self
            .refs
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |r| {
                r.checked_sub(1)
            }) {
            Ok(prev) => prev - 1,
            Err(_) => 0,
        }
    }

    pub fn allowed_seeks(&self) -> i64 {
        self.allowed_seeks.load(AtomicOrdering::Relaxed)
    }

    /// Sizes the seek budget from the file size.
    pub fn init_allowed_seeks(&self) {
        let seeks = ((self.file_size / BYTES_PER_SEEK) as i64).max(MIN_ALLOWED_SEEKS);
        self.allowed_seeks.store(seeks, AtomicOrdering::Relaxed);
    }

    /// Charges one wasted seek. Returns true once the budget is used up and
    /// the segment should be compacted.
    pub fn consume_seek(&self) -> bool {
        self.allowed_seeks.fetch_sub(1, AtomicOrdering::Relaxed) <= 1
    }
}

// A copy is not referenced by any version yet.
impl Clone for FileMetaData {
    fn clone(&self) -> Self {
        Self {
            refs: AtomicUsize::new(0),
            allowed_seeks: AtomicI64::new(self.allowed_seeks()),
            number: self.number,
            file_size: self.file_size,
            end_offset: self.end_offset,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
        }
    }
}

impl Debug for FileMetaData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetaData")
            .field("number", &self.number)
            .field("file_size", &self.file_size)
            .field("end_offset", &self.end_offset)
            .field("smallest", &format!("{}", self.smallest))
            .field("largest", &format!("{}", self.largest))
            .finish()
    }
}

impl PartialEq for FileMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.end_key() == other.end_key()
    }
}

impl Eq for FileMetaData {}

impl PartialOrd for FileMetaData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileMetaData {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| other.end_key().cmp(&self.end_key()))
    }
}

#[cfg(test)]
mod test {
    use crate::key::InternalKeyRef;
    use crate::version::file_meta::{FileMetaData, DEFAULT_ALLOWED_SEEKS};
    use std::cmp::Ordering;

    fn file(number: u64, end_offset: Option<u64>) -> FileMetaData {
        FileMetaData::new(
            number,
            1000,
            end_offset,
            InternalKeyRef::from((&b"a"[..], 1)).to_owned(),
            InternalKeyRef::from((&b"z"[..], 2)).to_owned(),
        )
    }

    #[test]
    fn test_ordering() {
        assert_eq!(file(5, Some(200)).cmp(&file(5, Some(100))), Ordering::Less);
        assert!(file(5, Some(200)) < file(5, Some(100)));
        assert!(file(3, Some(1)) < file(7, Some(900)));
        assert!(file(3, None) < file(7, Some(1)));
        // the whole-file segment sorts before every bounded one
        assert!(file(5, None) < file(5, Some(999)));
        assert_eq!(file(5, None), file(5, None));
        assert_ne!(file(5, Some(1)), file(5, None));

        let mut files = vec![
            file(7, Some(10)),
            file(5, Some(100)),
            file(5, None),
            file(3, Some(50)),
            file(5, Some(200)),
        ];
        files.sort();
        let got = files
            .iter()
            .map(|f| (f.number, f.end_offset))
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            vec![
                (3, Some(50)),
                (5, None),
                (5, Some(200)),
                (5, Some(100)),
                (7, Some(10))
            ]
        );
    }

    #[test]
    fn test_seek_budget() {
        let f = file(1, None);
        assert_eq!(f.allowed_seeks(), DEFAULT_ALLOWED_SEEKS);
        f.init_allowed_seeks();
        // 1000 bytes is below the floor
        assert_eq!(f.allowed_seeks(), 100);
        for _ in 0..99 {
            assert!(!f.consume_seek());
        }
        assert!(f.consume_seek());
        assert!(f.consume_seek());

        let mut big = file(2, None);
        big.file_size = 64 << 20;
        big.init_allowed_seeks();
        assert_eq!(big.allowed_seeks(), 4096);
        assert_eq!(big.limit(), 64 << 20);
        assert_eq!(file(3, Some(10)).limit(), 10);
        assert_eq!(file(4, Some(u64::MAX)).end_offset, None);
        assert_eq!(file(4, Some(u64::MAX)).limit(), 1000);
    }

    #[test]
    fn test_refs() {
        let f = file(1, None);
        f.add_ref();
        f.add_ref();
        assert_eq!(f.refs(), 2);
        let c = f.clone();
        assert_eq!(c.refs(), 0);
        assert_eq!(c, f);
        assert_eq!(f.unref(), 1);
        assert_eq!(f.unref(), 0);
    }
}
