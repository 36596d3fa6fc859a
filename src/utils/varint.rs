use crate::LError;

use bytes::{Buf, BufMut, Bytes, BytesMut};

const MAX_VARINT_LEN_64: usize = 10;

pub fn uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let (mut x, mut s) = (0u64, 0usize);
    for (i, &c) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN_64 {
            return None;
        }
        if c < 0x80 {
            if i == MAX_VARINT_LEN_64 - 1 && c > 1 {
                return None;
            }
            return Some((x | ((c as u64) << s), i + 1));
        }
        x |= ((c & 0x7f) as u64) << s;
        s += 7;
    }
    None
}

/// Consumes one varint from the front of `buf`. Leaves `buf` untouched on
/// failure.
pub fn take_uvarint(buf: &mut Bytes) -> Option<u64> {
    let (x, n) = uvarint(buf.as_ref())?;
    buf.advance(n);
    Some(x)
}

pub fn must_take_uvarint(buf: &mut Bytes, what: &str) -> Result<u64, LError> {
    take_uvarint(buf).ok_or_else(|| LError::corruption(format!("bad or truncated {}", what)))
}

/// Consumes a varint length followed by that many bytes.
pub fn take_length_prefixed(buf: &mut Bytes, what: &str) -> Result<Bytes, LError> {
    let l = must_take_uvarint(buf, what)?;
    if l > buf.len() as u64 {
        return Err(LError::corruption(format!(
            "{} needs {} bytes but only {} remain",
            what,
            l,
            buf.len()
        )));
    }
    Ok(buf.split_to(l as usize))
}

pub fn put_uvarint(buf: &mut BytesMut, mut x: u64) -> usize {
    let mut i = 0;
    while x >= 0x80 {
        buf.put_u8((x as u8) | 0x80);
        x >>= 7;
        i += 1;
    }
    buf.put_u8(x as u8);
    i + 1
}

pub fn put_length_prefixed(buf: &mut BytesMut, data: &[u8]) -> usize {
    let n = put_uvarint(buf, data.len() as u64);
    buf.put_slice(data);
    n + data.len()
}
