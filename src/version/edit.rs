//! The manifest record describing one change between two versions.
//!
//! Wire layout: a format version varint, then any number of tagged fields,
//! then `TAG_END`. Integers are varints, keys and names are length-prefixed.
//! An unbounded end offset is written as `u64::MAX`.

use crate::key::{InternalKey, SequenceNumber};
use crate::utils::varint::{must_take_uvarint, put_length_prefixed, put_uvarint, take_length_prefixed};
use crate::version::file_meta::{bounded_end, FileMetaData};
use crate::version::LEVELS;
use crate::LError;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

const FORMAT_VERSION: u64 = 1;

const TAG_END: u64 = 0;
const TAG_COMPARATOR: u64 = 1;
const TAG_LOG_NUMBER: u64 = 2;
const TAG_NEXT_FILE_NUMBER: u64 = 3;
const TAG_LAST_SEQUENCE: u64 = 4;
const TAG_COMPACT_POINTER: u64 = 5;
const TAG_DELETED_FILE: u64 = 6;
const TAG_NEW_FILE: u64 = 7;
// 8 was used for large value refs by old releases and is not accepted
const TAG_PREV_LOG_NUMBER: u64 = 9;

const NO_END_OFFSET: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DeletedFile {
    pub level: usize,
    pub number: u64,
    pub end_offset: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct VersionEdit {
    comparator_name: Option<String>,
    log_number: Option<u64>,
    prev_log_number: Option<u64>,
    next_file_number: Option<u64>,
    last_sequence: Option<SequenceNumber>,
    compact_pointers: Vec<(usize, InternalKey)>,
    deleted_files: BTreeSet<DeletedFile>,
    new_files: Vec<(usize, FileMetaData)>,
    applied: bool,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_comparator_name<S: Into<String>>(&mut self, name: S) {
        self.comparator_name = Some(name.into());
    }

    pub fn set_log_number(&mut self, num: u64) {
        self.log_number = Some(num);
    }

    pub fn set_prev_log_number(&mut self, num: u64) {
        self.prev_log_number = Some(num);
    }

    pub fn set_next_file_number(&mut self, num: u64) {
        self.next_file_number = Some(num);
    }

    pub fn set_last_sequence(&mut self, seq: SequenceNumber) {
        self.last_sequence = Some(seq);
    }

    pub fn add_compaction_pointer(&mut self, level: usize, key: InternalKey) {
        self.compact_pointers.push((level, key));
    }

    /// Records a new segment at `level`. `smallest` and `largest` must be the
    /// real bounds of the segment; they are not checked.
    pub fn add_file(
        &mut self,
        level: usize,
        number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
        end_offset: Option<u64>,
    ) {
        self.new_files.push((
            level,
            FileMetaData::new(number, file_size, end_offset, smallest, largest),
        ));
    }

    pub fn delete_file(&mut self, level: usize, f: &FileMetaData) {
        self.deleted_files.insert(DeletedFile {
            level,
            number: f.number,
            end_offset: bounded_end(f.end_offset),
        });
    }

    pub fn comparator_name(&self) -> Option<&str> {
        self.comparator_name.as_deref()
    }

    pub fn log_number(&self) -> Option<u64> {
        self.log_number
    }

    pub fn prev_log_number(&self) -> Option<u64> {
        self.prev_log_number
    }

    pub fn next_file_number(&self) -> Option<u64> {
        self.next_file_number
    }

    pub fn last_sequence(&self) -> Option<SequenceNumber> {
        self.last_sequence
    }

    pub fn compact_pointers(&self) -> &[(usize, InternalKey)] {
        self.compact_pointers.as_slice()
    }

    pub fn deleted_files(&self) -> impl Iterator<Item = &DeletedFile> {
        self.deleted_files.iter()
    }

    pub fn is_deleted(&self, level: usize, f: &FileMetaData) -> bool {
        self.deleted_files.contains(&DeletedFile {
            level,
            number: f.number,
            end_offset: bounded_end(f.end_offset),
        })
    }

    pub fn new_files(&self) -> &[(usize, FileMetaData)] {
        self.new_files.as_slice()
    }

    /// Whether the edit has already been installed by a version set.
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub(crate) fn mark_applied(&mut self) {
        self.applied = true;
    }

    pub(crate) fn check_levels(&self) -> Result<(), LError> {
        let levels = self
            .compact_pointers
            .iter()
            .map(|(l, _)| *l)
            .chain(self.deleted_files.iter().map(|d| d.level))
            .chain(self.new_files.iter().map(|(l, _)| *l));
        for level in levels {
            if level >= LEVELS {
                return Err(LError::InvalidArgument(format!(
                    "level {} out of range",
                    level
                )));
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::new();
        put_uvarint(&mut dst, FORMAT_VERSION);
        if let Some(name) = self.comparator_name.as_ref() {
            put_uvarint(&mut dst, TAG_COMPARATOR);
            put_length_prefixed(&mut dst, name.as_bytes());
        }
        if let Some(n) = self.log_number {
            put_uvarint(&mut dst, TAG_LOG_NUMBER);
            put_uvarint(&mut dst, n);
        }
        if let Some(n) = self.prev_log_number {
            put_uvarint(&mut dst, TAG_PREV_LOG_NUMBER);
            put_uvarint(&mut dst, n);
        }
        if let Some(n) = self.next_file_number {
            put_uvarint(&mut dst, TAG_NEXT_FILE_NUMBER);
            put_uvarint(&mut dst, n);
        }
        if let Some(n) = self.last_sequence {
            put_uvarint(&mut dst, TAG_LAST_SEQUENCE);
            put_uvarint(&mut dst, n);
        }
        for (level, key) in self.compact_pointers.iter() {
            put_uvarint(&mut dst, TAG_COMPACT_POINTER);
            put_uvarint(&mut dst, *level as u64);
            put_length_prefixed(&mut dst, key.as_ref());
        }
        for d in self.deleted_files.iter() {
            put_uvarint(&mut dst, TAG_DELETED_FILE);
            put_uvarint(&mut dst, d.level as u64);
            put_uvarint(&mut dst, d.number);
            put_uvarint(&mut dst, d.end_offset.unwrap_or(NO_END_OFFSET));
        }
        for (level, f) in self.new_files.iter() {
            put_uvarint(&mut dst, TAG_NEW_FILE);
            put_uvarint(&mut dst, *level as u64);
            put_uvarint(&mut dst, f.number);
            put_uvarint(&mut dst, f.file_size);
            put_uvarint(&mut dst, f.end_offset.unwrap_or(NO_END_OFFSET));
            put_length_prefixed(&mut dst, f.smallest.as_ref());
            put_length_prefixed(&mut dst, f.largest.as_ref());
        }
        put_uvarint(&mut dst, TAG_END);
        dst.freeze()
    }

    /// Parses a record produced by [`VersionEdit::encode`]. Truncated input,
    /// unknown tags, out of range levels and malformed keys are all reported
    /// as corruption.
    pub fn decode(mut src: Bytes) -> Result<Self, LError> {
        let version = must_take_uvarint(&mut src, "version edit format")?;
        if version != FORMAT_VERSION {
            return Err(LError::corruption(format!(
                "unsupported version edit format {}",
                version
            )));
        }
        let mut ve = VersionEdit::new();
        loop {
            let tag = must_take_uvarint(&mut src, "version edit tag")?;
            match tag {
                TAG_END => break,
                TAG_COMPARATOR => {
                    let name = take_length_prefixed(&mut src, "comparator name")?;
                    let name = String::from_utf8(name.to_vec())
                        .map_err(|_| LError::corruption("comparator name is not utf-8"))?;
                    ve.comparator_name = Some(name);
                }
                TAG_LOG_NUMBER => {
                    ve.log_number = Some(must_take_uvarint(&mut src, "log number")?)
                }
                TAG_PREV_LOG_NUMBER => {
                    ve.prev_log_number = Some(must_take_uvarint(&mut src, "previous log number")?)
                }
                TAG_NEXT_FILE_NUMBER => {
                    ve.next_file_number = Some(must_take_uvarint(&mut src, "next file number")?)
                }
                TAG_LAST_SEQUENCE => {
                    ve.last_sequence = Some(must_take_uvarint(&mut src, "last sequence")?)
                }
                TAG_COMPACT_POINTER => {
                    let level = take_level(&mut src)?;
                    let key = take_internal_key(&mut src, "compaction pointer")?;
                    ve.compact_pointers.push((level, key));
                }
                TAG_DELETED_FILE => {
                    let level = take_level(&mut src)?;
                    let number = must_take_uvarint(&mut src, "deleted file number")?;
                    let end_offset = take_end_offset(&mut src)?;
                    ve.deleted_files.insert(DeletedFile {
                        level,
                        number,
                        end_offset,
                    });
                }
                TAG_NEW_FILE => {
                    let level = take_level(&mut src)?;
                    let number = must_take_uvarint(&mut src, "new file number")?;
                    let file_size = must_take_uvarint(&mut src, "new file size")?;
                    let end_offset = take_end_offset(&mut src)?;
                    let smallest = take_internal_key(&mut src, "smallest key")?;
                    let largest = take_internal_key(&mut src, "largest key")?;
                    ve.add_file(level, number, file_size, smallest, largest, end_offset);
                }
                other => {
                    return Err(LError::corruption(format!(
                        "unknown version edit tag {}",
                        other
                    )))
                }
            }
        }
        if !src.is_empty() {
            return Err(LError::corruption(format!(
                "{} trailing bytes after version edit",
                src.len()
            )));
        }
        Ok(ve)
    }

    pub fn debug_string(&self) -> String {
        self.to_string()
    }

    fn new_file_fields(&self) -> Vec<(usize, u64, u64, Option<u64>, &InternalKey, &InternalKey)> {
        let mut v = self
            .new_files
            .iter()
            .map(|(l, f)| (*l, f.number, f.file_size, f.end_offset, &f.smallest, &f.largest))
            .collect::<Vec<_>>();
        v.sort_by(|a, b| (a.0, a.1, a.3).cmp(&(b.0, b.1, b.3)));
        v
    }
}

fn take_level(src: &mut Bytes) -> Result<usize, LError> {
    let level = must_take_uvarint(src, "level")?;
    if level >= LEVELS as u64 {
        return Err(LError::corruption(format!("level {} out of range", level)));
    }
    Ok(level as usize)
}

fn take_end_offset(src: &mut Bytes) -> Result<Option<u64>, LError> {
    match must_take_uvarint(src, "end offset")? {
        NO_END_OFFSET => Ok(None),
        end => Ok(Some(end)),
    }
}

fn take_internal_key(src: &mut Bytes, what: &str) -> Result<InternalKey, LError> {
    InternalKey::try_from(take_length_prefixed(src, what)?)
}

/// Field by field, ignoring whether the edit was applied. New files compare
/// as a set.
impl PartialEq for VersionEdit {
    fn eq(&self, other: &Self) -> bool {
        self.comparator_name == other.comparator_name
            && self.log_number == other.log_number
            && self.prev_log_number == other.prev_log_number
            && self.next_file_number == other.next_file_number
            && self.last_sequence == other.last_sequence
            && self.compact_pointers == other.compact_pointers
            && self.deleted_files == other.deleted_files
            && self.new_file_fields() == other.new_file_fields()
    }
}

impl Display for VersionEdit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "VersionEdit {{")?;
        if let Some(name) = self.comparator_name.as_ref() {
            writeln!(f, "  Comparator: {}", name)?;
        }
        if let Some(n) = self.log_number {
            writeln!(f, "  LogNumber: {}", n)?;
        }
        if let Some(n) = self.prev_log_number {
            writeln!(f, "  PrevLogNumber: {}", n)?;
        }
        if let Some(n) = self.next_file_number {
            writeln!(f, "  NextFile: {}", n)?;
        }
        if let Some(n) = self.last_sequence {
            writeln!(f, "  LastSeq: {}", n)?;
        }
        for (level, key) in self.compact_pointers.iter() {
            writeln!(f, "  CompactPointer: {} {}", level, key)?;
        }
        for d in self.deleted_files.iter() {
            writeln!(f, "  DeleteFile: {} {} {:?}", d.level, d.number, d.end_offset)?;
        }
        for (level, file) in self.new_files.iter() {
            writeln!(
                f,
                "  AddFile: {} {} {} {:?} {} .. {}",
                level, file.number, file.file_size, file.end_offset, file.smallest, file.largest
            )?;
        }
        write!(f, "}}")
    }
}
