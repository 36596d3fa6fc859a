use crate::io::StorageSystem;
use crate::iterator::DBScanner;
use crate::key::{InternalKey, SequenceNumber};
use crate::opts::{Opts, ReadOptions};
use crate::table::TableOpener;
use crate::table_cache::TableCache;
use crate::version::edit::VersionEdit;
use crate::version::file_meta::FileMetaData;
use crate::LError;
use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error};
use std::collections::HashMap;
use std::sync::Arc;

pub mod edit;
pub mod file_meta;

pub const LEVELS: usize = 7;

/// A segment no version refers to any more. The owner of the receiving end
/// evicts it from the table cache and deletes the file once none of its
/// segments are live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ObsoleteFile {
    pub number: u64,
    pub end_offset: Option<u64>,
}

pub type VersionPtr = Arc<Version>;

/// An immutable set of live segments per level. Every segment in a version
/// holds one reference for as long as the version exists.
#[derive(Debug)]
pub struct Version {
    files: Vec<Vec<Arc<FileMetaData>>>,
    obsolete: Option<Sender<ObsoleteFile>>,
}

impl Version {
    pub fn new(obsolete: Option<Sender<ObsoleteFile>>) -> Self {
        Self::with_files((0..LEVELS).map(|_x| vec![]).collect(), obsolete)
    }

    fn with_files(files: Vec<Vec<Arc<FileMetaData>>>, obsolete: Option<Sender<ObsoleteFile>>) -> Self {
        files.iter().flatten().for_each(|f| f.add_ref());
        Self { files, obsolete }
    }

    fn rebind(&self, obsolete: Sender<ObsoleteFile>) -> Self {
        Self::with_files(self.files.clone(), Some(obsolete))
    }

    pub fn files(&self, level: usize) -> &[Arc<FileMetaData>] {
        self.files.get(level).map(|x| x.as_slice()).unwrap_or(&[])
    }

    pub fn num_files(&self, level: usize) -> usize {
        self.files(level).len()
    }

    pub fn total_files(&self) -> usize {
        self.files.iter().map(|x| x.len()).sum()
    }

    /// Builds the version that results from applying `ve` to this one.
    pub fn edit(&self, ve: &VersionEdit) -> Result<Version, LError> {
        ve.check_levels()?;
        let mut files: Vec<Vec<Arc<FileMetaData>>> = (0..LEVELS).map(|_x| vec![]).collect();
        let mut removed = HashMap::new();
        for (level, fs) in self.files.iter().enumerate() {
            for f in fs.iter() {
                if ve.is_deleted(level, f) {
                    removed.insert((f.number, f.end_offset), f.clone());
                } else {
                    files[level].push(f.clone());
                }
            }
        }
        for (level, f) in ve.new_files() {
            // a segment moved to another level stays the same segment
            let f = match removed.remove(&(f.number, f.end_offset)) {
                Some(moved) => moved,
                None => {
                    let f = Arc::new(f.clone());
                    f.init_allowed_seeks();
                    f
                }
            };
            files[*level].push(f);
        }
        files.iter_mut().for_each(|fs| fs.sort());
        Ok(Version::with_files(files, self.obsolete.clone()))
    }

    /// Appends one scanner per segment, level by level.
    pub fn add_scanners<E: StorageSystem, O: TableOpener<E::O>>(
        &self,
        tc: &TableCache<E, O>,
        ropts: &ReadOptions,
        out: &mut Vec<Box<dyn DBScanner>>,
    ) {
        for f in self.files.iter().flatten() {
            out.push(tc.new_iterator(ropts, f.number, f.file_size, f.end_offset));
        }
    }
}

impl Drop for Version {
    fn drop(&mut self) {
        for f in self.files.iter().flatten() {
            if f.unref() != 0 {
                continue;
            }
            debug!(
                "table {} segment ending at {:?} is obsolete",
                f.number, f.end_offset
            );
            if let Some(tx) = self.obsolete.as_ref() {
                let _ = tx.send(ObsoleteFile {
                    number: f.number,
                    end_offset: f.end_offset,
                });
            }
        }
    }
}

/// The current version plus the counters persisted alongside it.
pub struct VersionSet {
    dbname: String,
    opts: Opts,
    current: VersionPtr,
    obsolete_tx: Sender<ObsoleteFile>,
    log_number: u64,
    prev_log_number: u64,
    next_file_number: u64,
    last_sequence: SequenceNumber,
    manifest_file_number: u64,
    compact_pointers: Vec<Option<InternalKey>>,
}

impl VersionSet {
    /// Returns the set and the receiving end of its obsolete segment
    /// notifications.
    pub fn new(dbname: &str, opts: Opts) -> (Self, Receiver<ObsoleteFile>) {
        let (tx, rx) = unbounded();
        let vs = Self {
            dbname: dbname.to_string(),
            opts,
            current: Arc::new(Version::new(Some(tx.clone()))),
            obsolete_tx: tx,
            log_number: 0,
            prev_log_number: 0,
            next_file_number: 2,
            last_sequence: 0,
            manifest_file_number: 0,
            compact_pointers: vec![None; LEVELS],
        };
        (vs, rx)
    }

    pub fn current(&self) -> VersionPtr {
        self.current.clone()
    }

    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    pub fn manifest_file_number(&self) -> u64 {
        self.manifest_file_number
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    pub fn set_last_sequence(&mut self, seq: SequenceNumber) -> Result<(), LError> {
        if seq < self.last_sequence {
            error!(
                "{}: last sequence moved back from {} to {}",
                self.dbname, self.last_sequence, seq
            );
            return Err(LError::precondition("last sequence cannot move backwards"));
        }
        self.last_sequence = seq;
        Ok(())
    }

    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// Hands `number` back if it was the last one allocated and never used.
    pub fn reuse_file_number(&mut self, number: u64) {
        if self.next_file_number == number + 1 {
            self.next_file_number = number;
        }
    }

    pub fn mark_file_number_used(&mut self, number: u64) {
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
    }

    pub fn compact_pointer(&self, level: usize) -> Option<&InternalKey> {
        self.compact_pointers.get(level).and_then(|x| x.as_ref())
    }

    /// Completes `ve` with the current counters, installs the resulting
    /// version and returns the record to append to the manifest. An edit can
    /// only be applied once.
    pub fn log_and_apply(&mut self, ve: &mut VersionEdit) -> Result<Bytes, LError> {
        if ve.is_applied() {
            error!("{}: version edit applied twice: {}", self.dbname, ve.debug_string());
            return Err(LError::precondition("version edit already applied"));
        }
        match ve.log_number() {
            Some(n) if n < self.log_number || n >= self.next_file_number => {
                error!(
                    "{}: log number {} outside [{}, {})",
                    self.dbname, n, self.log_number, self.next_file_number
                );
                return Err(LError::precondition(format!("invalid log number {}", n)));
            }
            Some(_) => {}
            None => ve.set_log_number(self.log_number),
        }
        if ve.prev_log_number().is_none() {
            ve.set_prev_log_number(self.prev_log_number);
        }
        ve.set_next_file_number(self.next_file_number);
        ve.set_last_sequence(self.last_sequence);

        let v = self.current.edit(ve)?;
        let record = ve.encode();
        for (level, key) in ve.compact_pointers() {
            if let Some(p) = self.compact_pointers.get_mut(*level) {
                *p = Some(key.clone());
            }
        }
        self.log_number = ve.log_number().unwrap_or(self.log_number);
        self.prev_log_number = ve.prev_log_number().unwrap_or(self.prev_log_number);
        self.current = Arc::new(v);
        ve.mark_applied();
        debug!(
            "{}: installed version with {} files, log number {}",
            self.dbname,
            self.current.total_files(),
            self.log_number
        );
        Ok(record)
    }

    /// Rebuilds the state from manifest records, oldest first.
    pub fn recover<I: IntoIterator<Item = Bytes>>(&mut self, records: I) -> Result<(), LError> {
        let mut version = Version::new(None);
        let mut log_number = None;
        let mut prev_log_number = None;
        let mut next_file_number = None;
        let mut last_sequence = None;
        let mut pointers: Vec<Option<InternalKey>> = vec![None; LEVELS];
        for record in records {
            let ve = VersionEdit::decode(record)?;
            if let Some(name) = ve.comparator_name() {
                let ours = self.opts.get_ucmp().name();
                if name != ours {
                    error!(
                        "{}: manifest comparator {} does not match {}",
                        self.dbname, name, ours
                    );
                    return Err(LError::InvalidArgument(format!(
                        "comparator {} does not match existing comparator {}",
                        ours, name
                    )));
                }
            }
            version = version.edit(&ve)?;
            for (level, key) in ve.compact_pointers() {
                if let Some(p) = pointers.get_mut(*level) {
                    *p = Some(key.clone());
                }
            }
            log_number = ve.log_number().or(log_number);
            prev_log_number = ve.prev_log_number().or(prev_log_number);
            next_file_number = ve.next_file_number().or(next_file_number);
            last_sequence = ve.last_sequence().or(last_sequence);
        }
        let next_file_number = next_file_number
            .ok_or_else(|| LError::corruption("no next file number in manifest"))?;
        let log_number =
            log_number.ok_or_else(|| LError::corruption("no log number in manifest"))?;
        let last_sequence =
            last_sequence.ok_or_else(|| LError::corruption("no last sequence in manifest"))?;
        let prev_log_number = prev_log_number.unwrap_or(0);

        self.current = Arc::new(version.rebind(self.obsolete_tx.clone()));
        self.compact_pointers = pointers;
        self.manifest_file_number = next_file_number;
        self.next_file_number = next_file_number + 1;
        self.mark_file_number_used(prev_log_number);
        self.mark_file_number_used(log_number);
        self.log_number = log_number;
        self.prev_log_number = prev_log_number;
        self.last_sequence = last_sequence;
        debug!(
            "{}: recovered {} files, next file {}, last sequence {}",
            self.dbname,
            self.current.total_files(),
            self.next_file_number,
            self.last_sequence
        );
        Ok(())
    }

    /// A single edit describing the whole current state, used to start a
    /// new manifest.
    pub fn write_snapshot(&self) -> VersionEdit {
        let mut ve = VersionEdit::new();
        ve.set_comparator_name(self.opts.get_ucmp().name());
        ve.set_log_number(self.log_number);
        ve.set_prev_log_number(self.prev_log_number);
        ve.set_next_file_number(self.next_file_number);
        ve.set_last_sequence(self.last_sequence);
        for (level, p) in self.compact_pointers.iter().enumerate() {
            if let Some(key) = p {
                ve.add_compaction_pointer(level, key.clone());
            }
        }
        for level in 0..LEVELS {
            for f in self.current.files(level) {
                ve.add_file(
                    level,
                    f.number,
                    f.file_size,
                    f.smallest.clone(),
                    f.largest.clone(),
                    f.end_offset,
                );
            }
        }
        ve
    }
}
