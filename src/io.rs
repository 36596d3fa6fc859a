use crate::LError;
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::sync::{Arc, Mutex};

/// A file that supports positional reads from many threads at once.
pub trait RandomAccessFile: Send + Sync + 'static {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, LError>;

    fn size(&self) -> Result<u64, LError>;

    fn read_exact_at(&self, mut offset: u64, buf: &mut [u8]) -> Result<(), LError> {
        let mut start = 0;
        while start < buf.len() {
            let s = self.read_at(offset, buf[start..].as_mut())?;
            if s == 0 {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("short read at offset {}", offset),
                )
                .into());
            }
            start += s;
            offset += s as u64;
        }
        Ok(())
    }
}

impl RandomAccessFile for File {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, LError> {
        FileExt::read_at(self, buf, offset).map_err(LError::from)
    }

    fn size(&self) -> Result<u64, LError> {
        Ok(self.metadata()?.len())
    }
}

pub trait StorageSystem: Send + Sync + 'static {
    type O: RandomAccessFile;

    fn open_random_access(&self, name: &str) -> Result<Self::O, LError>;

    fn exists(&self, name: &str) -> Result<bool, LError>;

    fn remove(&self, name: &str) -> Result<(), LError>;
}

pub static OS_FS: OsFS = OsFS {};

#[derive(Default, Copy, Clone, Debug)]
pub struct OsFS {}

impl StorageSystem for OsFS {
    type O = File;

    fn open_random_access(&self, name: &str) -> Result<File, LError> {
        File::open(name).map_err(LError::from)
    }

    fn exists(&self, name: &str) -> Result<bool, LError> {
        match std::fs::metadata(name) {
            Ok(_) => Ok(true),
            Err(k) => {
                if k.kind() == ErrorKind::NotFound {
                    Ok(false)
                } else {
                    Err(k.into())
                }
            }
        }
    }

    fn remove(&self, name: &str) -> Result<(), LError> {
        std::fs::remove_file(name).map_err(LError::from)
    }
}

#[derive(Clone, Debug)]
pub struct MemFile {
    data: Bytes,
}

impl RandomAccessFile for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, LError> {
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let len = buf.len().min(self.data.len() - start);
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(len)
    }

    fn size(&self) -> Result<u64, LError> {
        Ok(self.data.len() as u64)
    }
}

/// An in-memory file system. Files are immutable once written; every
/// successful `open_random_access` is counted per name.
#[derive(Clone, Default)]
pub struct MemFS {
    files: Arc<Mutex<HashMap<String, Bytes>>>,
    opens: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemFS {
    pub fn write_file<D: Into<Bytes>>(&self, name: &str, data: D) -> Result<(), LError> {
        self.files.lock()?.insert(name.to_string(), data.into());
        Ok(())
    }

    pub fn open_count(&self, name: &str) -> usize {
        match self.opens.lock() {
            Ok(opens) => opens.get(name).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn total_opens(&self) -> usize {
        match self.opens.lock() {
            Ok(opens) => opens.values().sum(),
            Err(_) => 0,
        }
    }
}

impl StorageSystem for MemFS {
    type O = MemFile;

    fn open_random_access(&self, name: &str) -> Result<Self::O, LError> {
        let data = self.files.lock()?.get(name).cloned().ok_or_else(|| {
            LError::from(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{}: no such file", name),
            ))
        })?;
        *self.opens.lock()?.entry(name.to_string()).or_insert(0) += 1;
        Ok(MemFile { data })
    }

    fn exists(&self, name: &str) -> Result<bool, LError> {
        Ok(self.files.lock()?.contains_key(name))
    }

    fn remove(&self, name: &str) -> Result<(), LError> {
        match self.files.lock()?.remove(name) {
            Some(_) => Ok(()),
            None => Err(LError::NotFound(name.to_string())),
        }
    }
}
