use crate::compare::{Comparator, ComparatorImpl};
use crate::key::InternalKeyKind::{Delete, Set};
use crate::LError;
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

pub type SequenceNumber = u64;

/// Sequence numbers occupy the upper 56 bits of the packed trailer.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

const TRAILER_LEN: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InternalKeyKind {
    Delete = 0,
    Set = 1,
}

impl Default for InternalKeyKind {
    fn default() -> Self {
        Set
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalKeyRef<'a> {
    pub ukey: &'a [u8],
    pub k: InternalKeyKind,
    pub seq_num: SequenceNumber,
}

impl<'a, 'b: 'a> From<(&'b [u8], SequenceNumber)> for InternalKeyRef<'a> {
    fn from(value: (&'b [u8], SequenceNumber)) -> Self {
        InternalKeyRef {
            ukey: value.0,
            seq_num: value.1,
            k: Set,
        }
    }
}

impl<'a> InternalKeyRef<'a> {
    pub fn new(ukey: &'a [u8], seq_num: SequenceNumber, k: InternalKeyKind) -> Self {
        Self { ukey, seq_num, k }
    }

    /// Splits an encoded internal key into its parts.
    pub fn parse(value: &'a [u8]) -> Result<Self, LError> {
        if value.len() < TRAILER_LEN {
            return Err(LError::InvalidInternalKey(value.to_vec()));
        }
        let l = value.len();
        let mut trailer = [0u8; TRAILER_LEN];
        trailer.copy_from_slice(&value[l - TRAILER_LEN..]);
        let sk = u64::from_le_bytes(trailer);
        let k = match sk & 0xff {
            0 => Delete,
            1 => Set,
            _ => return Err(LError::InvalidInternalKey(value.to_vec())),
        };
        Ok(Self {
            ukey: &value[..l - TRAILER_LEN],
            k,
            seq_num: sk >> 8,
        })
    }

    pub fn to_owned(&self) -> InternalKey {
        let mut ik = BytesMut::with_capacity(self.ukey.len() + TRAILER_LEN);
        ik.put_slice(self.ukey);
        ik.put_u64_le((self.seq_num << 8) | (self.k as u64));
        InternalKey(ik.freeze())
    }
}

/// An encoded user key plus its `(sequence, kind)` trailer. Always holds a
/// well-formed encoding: every constructor validates or builds it.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct InternalKey(Bytes);

impl InternalKey {
    pub fn new(ukey: &[u8], seq_num: SequenceNumber, k: InternalKeyKind) -> Self {
        InternalKeyRef::new(ukey, seq_num, k).to_owned()
    }

    pub fn borrow(&self) -> InternalKeyRef<'_> {
        InternalKeyRef {
            ukey: self.ukey(),
            seq_num: self.seq_num(),
            k: self.kind(),
        }
    }

    pub fn ukey(&self) -> &[u8] {
        &self.0[..self.0.len() - TRAILER_LEN]
    }

    fn trailer(&self) -> u64 {
        let mut trailer = [0u8; TRAILER_LEN];
        trailer.copy_from_slice(&self.0[self.0.len() - TRAILER_LEN..]);
        u64::from_le_bytes(trailer)
    }

    pub fn seq_num(&self) -> SequenceNumber {
        self.trailer() >> 8
    }

    pub fn kind(&self) -> InternalKeyKind {
        if self.trailer() & 0xff == 0 {
            Delete
        } else {
            Set
        }
    }

    pub fn encoded(&self) -> &Bytes {
        &self.0
    }
}

impl Display for InternalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let uk = match std::str::from_utf8(self.ukey()) {
            Ok(u) => u.to_string(),
            Err(_) => format!("{:?}", self.ukey()),
        };
        write!(f, "'{}' @ {} : {}", uk, self.seq_num(), self.kind() as u8)
    }
}

impl TryFrom<Bytes> for InternalKey {
    type Error = LError;

    fn try_from(value: Bytes) -> Result<Self, Self::Error> {
        InternalKeyRef::parse(value.as_ref())?;
        Ok(InternalKey(value))
    }
}

impl From<InternalKey> for Bytes {
    fn from(k: InternalKey) -> Bytes {
        k.0
    }
}

impl AsRef<[u8]> for InternalKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalKeyComparator {
    pub(crate) u: ComparatorImpl,
}

impl From<ComparatorImpl> for InternalKeyComparator {
    fn from(u: ComparatorImpl) -> Self {
        Self { u }
    }
}

impl InternalKeyComparator {
    pub fn user_comparator(&self) -> ComparatorImpl {
        self.u
    }

    pub fn compare_keyref(&self, a: &InternalKeyRef, b: &InternalKeyRef) -> Ordering {
        match self.u.compare(a.ukey, b.ukey) {
            // newer entries of the same user key come first
            Ordering::Equal => b
                .seq_num
                .cmp(&a.seq_num)
                .then_with(|| (b.k as u8).cmp(&(a.k as u8))),
            o => o,
        }
    }

    pub fn compare_keys(&self, a: &InternalKey, b: &InternalKey) -> Ordering {
        self.compare_keyref(&a.borrow(), &b.borrow())
    }
}

impl Comparator for InternalKeyComparator {
    /// Both sides must be encoded internal keys; malformed input falls back
    /// to a bytewise comparison.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (InternalKeyRef::parse(a), InternalKeyRef::parse(b)) {
            (Ok(ka), Ok(kb)) => self.compare_keyref(&ka, &kb),
            _ => a.cmp(b),
        }
    }

    fn name(&self) -> &'static str {
        "leveldb.InternalKeyComparator"
    }
}

#[cfg(test)]
mod test {
    use crate::compare::{Comparator, BYTEWISE_COMPARATOR};
    use crate::key::{InternalKey, InternalKeyComparator, InternalKeyKind, InternalKeyRef};
    use bytes::Bytes;
    use std::cmp::Ordering;

    #[test]
    fn test_internal_key_order() {
        let key_nums = vec![
            ("a", 2u64),
            ("a", 1),
            ("aa", 3),
            ("ab", 4),
            ("long", 1 << 24),
            ("long", 1 << 8),
        ];
        let ic = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
        let ikeys = key_nums
            .iter()
            .map(|(k, n)| InternalKeyRef::from((k.as_bytes(), *n)).to_owned())
            .collect::<Vec<InternalKey>>();
        for i in 0..key_nums.len() {
            assert_eq!(key_nums[i].0.as_bytes(), ikeys[i].ukey());
            assert_eq!(key_nums[i].1, ikeys[i].seq_num());
            if i > 0 {
                assert_eq!(ic.compare_keys(&ikeys[i], &ikeys[i - 1]), Ordering::Greater);
                assert_eq!(
                    ic.compare(ikeys[i].as_ref(), ikeys[i - 1].as_ref()),
                    Ordering::Greater
                );
            }
        }
    }

    #[test]
    fn test_internal_key_parts() {
        let keys = vec![
            (b"a", 1u64, InternalKeyKind::Set),
            (b"b", 2, InternalKeyKind::Delete),
            (b"b", 3, InternalKeyKind::Set),
        ];
        for (d, n, k) in keys.iter() {
            let ik = InternalKey::new(d.as_ref(), *n, *k);
            assert_eq!(ik.ukey(), d.as_ref());
            assert_eq!(ik.seq_num(), *n);
            assert_eq!(ik.kind(), *k);
            let back = InternalKey::try_from(ik.encoded().clone()).unwrap();
            assert_eq!(back, ik);
        }
    }

    #[test]
    fn test_malformed_internal_key() {
        assert!(InternalKey::try_from(Bytes::from_static(b"short")).is_err());
        // kind byte 7 is not a known value type
        let mut raw = b"key".to_vec();
        raw.extend_from_slice(&((5u64 << 8) | 7).to_le_bytes());
        let err = InternalKey::try_from(Bytes::from(raw)).unwrap_err();
        assert!(err.is_corruption());
    }
}
