use crate::key::{InternalKey, InternalKeyComparator};
use crate::utils::call_on_drop::CallOnDrop;
use crate::LError;
use bytes::Bytes;
use std::cmp::Ordering;

pub type ScanEntry = (InternalKey, Bytes);

/// A forward cursor over internal-key ordered entries.
pub trait DBScanner: Send {
    /// Positions the scanner so that the next `next()` yields the first entry
    /// whose key is at or after `target` (an encoded internal key).
    fn seek(&mut self, target: &[u8]) -> Result<(), LError>;

    fn next(&mut self) -> Result<Option<ScanEntry>, LError>;
}

/// Stands in for a source that could not be opened. The failure is reported
/// on first use rather than at construction, so it can be merged with
/// healthy sources.
pub struct ErrorScanner {
    err: LError,
}

impl ErrorScanner {
    pub fn new(err: LError) -> Self {
        Self { err }
    }
}

impl DBScanner for ErrorScanner {
    fn seek(&mut self, _target: &[u8]) -> Result<(), LError> {
        Err(self.err.clone())
    }

    fn next(&mut self) -> Result<Option<ScanEntry>, LError> {
        Err(self.err.clone())
    }
}

pub struct CleanupScanner {
    // declared first: the inner scanner must go before its cleanups run
    inner: Box<dyn DBScanner>,
    cleanups: Vec<CallOnDrop>,
}

impl CleanupScanner {
    pub fn new(inner: Box<dyn DBScanner>) -> Self {
        Self {
            inner,
            cleanups: vec![],
        }
    }

    pub fn register_cleanup(&mut self, c: CallOnDrop) {
        self.cleanups.push(c);
    }
}

impl DBScanner for CleanupScanner {
    fn seek(&mut self, target: &[u8]) -> Result<(), LError> {
        self.inner.seek(target)
    }

    fn next(&mut self) -> Result<Option<ScanEntry>, LError> {
        self.inner.next()
    }
}

/// Merges several scanners into one internal-key ordered stream. The first
/// error from any child ends the merge with that error.
pub struct MergeScanner {
    scanners: Vec<(Box<dyn DBScanner>, Option<ScanEntry>, bool)>,
    cmp: InternalKeyComparator,
}

impl MergeScanner {
    pub fn new(cmp: InternalKeyComparator, scanners: Vec<Box<dyn DBScanner>>) -> Self {
        Self {
            cmp,
            scanners: scanners.into_iter().map(|x| (x, None, false)).collect(),
        }
    }

    fn fill(&mut self) -> Result<(), LError> {
        for (s, head, exhausted) in self.scanners.iter_mut() {
            if head.is_none() && !*exhausted {
                match s.next()? {
                    Some(kv) => *head = Some(kv),
                    None => *exhausted = true,
                }
            }
        }
        Ok(())
    }
}

impl DBScanner for MergeScanner {
    fn seek(&mut self, target: &[u8]) -> Result<(), LError> {
        for (s, head, exhausted) in self.scanners.iter_mut() {
            s.seek(target)?;
            *head = None;
            *exhausted = false;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<ScanEntry>, LError> {
        self.fill()?;
        let mut smallest: Option<usize> = None;
        for (i, (_, head, _)) in self.scanners.iter().enumerate() {
            let k = match head {
                Some((k, _)) => k,
                None => continue,
            };
            smallest = match smallest {
                Some(j) => match &self.scanners[j].1 {
                    Some((sk, _)) if self.cmp.compare_keys(k, sk) != Ordering::Less => Some(j),
                    _ => Some(i),
                },
                None => Some(i),
            };
        }
        Ok(smallest.and_then(|i| self.scanners[i].1.take()))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use crate::compare::BYTEWISE_COMPARATOR;
    use crate::iterator::{
        CleanupScanner, DBScanner, ErrorScanner, MergeScanner, ScanEntry,
    };
    use crate::key::{InternalKey, InternalKeyComparator, InternalKeyRef};
    use crate::{call_on_drop, LError};
    use bytes::Bytes;
    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    pub(crate) struct VecScanner {
        entries: Vec<ScanEntry>,
        pos: usize,
    }

    impl VecScanner {
        pub(crate) fn new(entries: Vec<ScanEntry>) -> Self {
            Self { entries, pos: 0 }
        }
    }

    impl DBScanner for VecScanner {
        fn seek(&mut self, target: &[u8]) -> Result<(), LError> {
            let icmp = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
            let target = InternalKeyRef::parse(target)?;
            self.pos = self
                .entries
                .iter()
                .position(|(k, _)| icmp.compare_keyref(&k.borrow(), &target) != Ordering::Less)
                .unwrap_or(self.entries.len());
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

    pub(crate) fn entry(k: &str, seq: u64) -> ScanEntry {
        (
            InternalKeyRef::from((k.as_bytes(), seq)).to_owned(),
            Bytes::from(format!("{}@{}", k, seq)),
        )
    }

    pub(crate) fn drain(s: &mut dyn DBScanner) -> Result<Vec<InternalKey>, LError> {
        let mut out = vec![];
        while let Some((k, _)) = s.next()? {
            out.push(k);
        }
        Ok(out)
    }

    #[test]
    fn test_error_scanner_fails_lazily() {
        let mut s = ErrorScanner::new(LError::corruption("bad table"));
        assert!(s.next().unwrap_err().is_corruption());
        assert!(s.next().unwrap_err().is_corruption());
        assert!(s.seek(b"anything").is_err());
    }

    #[test]
    fn test_cleanup_scanner() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let c = cleaned.clone();
        let mut s = CleanupScanner::new(Box::new(VecScanner::new(vec![entry("a", 1)])));
        s.register_cleanup(call_on_drop!({
            c.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        assert!(s.next().unwrap().is_some());
        assert!(s.next().unwrap().is_none());
        assert_eq!(cleaned.load(AtomicOrdering::SeqCst), 0);
        drop(s);
        assert_eq!(cleaned.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_merging_scanner() {
        let icmp = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
        let a = VecScanner::new(vec![entry("a", 5), entry("c", 3), entry("e", 1)]);
        let b = VecScanner::new(vec![entry("a", 7), entry("b", 2), entry("d", 9)]);
        let empty = VecScanner::new(vec![]);
        let mut m = MergeScanner::new(icmp, vec![Box::new(a), Box::new(empty), Box::new(b)]);
        let keys = drain(&mut m).unwrap();
        let got = keys
            .iter()
            .map(|k| (String::from_utf8(k.ukey().to_vec()).unwrap(), k.seq_num()))
            .collect::<Vec<(String, u64)>>();
        let expected = vec![("a", 7), ("a", 5), ("b", 2), ("c", 3), ("d", 9), ("e", 1)]
            .into_iter()
            .map(|(k, s)| (k.to_string(), s))
            .collect::<Vec<(String, u64)>>();
        assert_eq!(got, expected);

        let target = entry("c", u64::MAX >> 8).0;
        m.seek(target.as_ref()).unwrap();
        let rest = drain(&mut m).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].ukey(), b"c");
    }

    #[test]
    fn test_merging_scanner_surfaces_child_error() {
        let icmp = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
        let ok = VecScanner::new(vec![entry("a", 1)]);
        let bad = ErrorScanner::new(LError::NotFound("000009.ldb".into()));
        let mut m = MergeScanner::new(icmp, vec![Box::new(ok), Box::new(bad)]);
        match m.next() {
            Err(LError::NotFound(name)) => assert_eq!(name, "000009.ldb"),
            other => panic!("unexpected {:?}", other.map(|e| e.map(|(k, _)| k))),
        }
    }
}
