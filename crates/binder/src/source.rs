//! Reading module bytes from their origin.
//!
//! Path origins are read either with `fs::read` or through a memory map;
//! stream origins are drained to completion. Failures surface unchanged as
//! `std::io::Error` and are never retried.

use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;

/// Bytes of a module, owned or mapped.
pub(crate) enum ModuleBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for ModuleBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ModuleBytes::Owned(bytes) => bytes.as_slice(),
            ModuleBytes::Mapped(map) => &map[..],
        }
    }
}

pub(crate) fn read_path(path: &Path, use_memory_mapping: bool) -> io::Result<ModuleBytes> {
    if !use_memory_mapping {
        return fs::read(path).map(ModuleBytes::Owned);
    }

    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(ModuleBytes::Owned(Vec::new()));
    }
    // SAFETY: the map is only read while parsing and dropped before the load
    // returns; images are not expected to be truncated concurrently.
    let map = unsafe { Mmap::map(&file)? };
    Ok(ModuleBytes::Mapped(map))
}

pub(crate) fn read_stream(reader: &mut dyn Read) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    #[test]
    fn test_read_path_owned_and_mapped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.bin");
        fs::write(&path, b"MODI-bytes").unwrap();

        let owned = read_path(&path, false).unwrap();
        assert!(matches!(owned, ModuleBytes::Owned(_)));
        assert_eq!(&*owned, b"MODI-bytes");

        let mapped = read_path(&path, true).unwrap();
        assert!(matches!(mapped, ModuleBytes::Mapped(_)));
        assert_eq!(&*mapped, b"MODI-bytes");
    }

    #[test]
    fn test_read_empty_file_mapped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();
        assert!(read_path(&path, true).unwrap().is_empty());
    }

    #[test]
    fn test_read_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_path(&temp_dir.path().join("missing.bin"), false)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_stream() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        assert_eq!(read_stream(&mut cursor).unwrap(), vec![1, 2, 3]);

        let err = read_stream(&mut FailingReader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
