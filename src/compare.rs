use std::cmp::Ordering;
use std::fmt::Debug;

pub trait Comparator: Send + Sync + Debug {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Persisted in the manifest; a database must always be reopened with a
    /// comparator of the same name.
    fn name(&self) -> &'static str;
}

pub type ComparatorImpl = &'static dyn Comparator;

pub const BYTEWISE_COMPARATOR: ComparatorImpl = &BytewiseComparator {};

#[derive(Default, Clone, Copy, Debug)]
pub struct BytewiseComparator {}

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        "leveldb.BytewiseComparator"
    }
}
