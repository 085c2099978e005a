//! Durable backup tier
//!
//! One JSON record per book under a directory. Each record wraps the
//! serialized book with its CRC32:
//!
//! ```text
//! {"checksum": <u32>, "book": "<serialized book>"}
//! ```
//!
//! Writes go to a temporary file which is fsynced, then renamed over the
//! final name. Record file names are the book id with `:` replaced by `_`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::observability::Logger;

use super::book::{Book, BookStorage};
use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{StorageError, StorageResult};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Serialize, Deserialize)]
struct Envelope {
    checksum: u32,
    book: String,
}

/// Serialize `book` inside its checksummed envelope
pub(crate) fn seal_book(book: &Book) -> StorageResult<Vec<u8>> {
    let payload = serde_json::to_string(book)?;
    let envelope = Envelope {
        checksum: compute_checksum(payload.as_bytes()),
        book: payload,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Verify and decode an envelope written by [`seal_book`]
pub(crate) fn open_book(bytes: &[u8], label: &str) -> StorageResult<Book> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if !verify_checksum(envelope.book.as_bytes(), envelope.checksum) {
        return Err(StorageError::ChecksumMismatch(label.to_string()));
    }
    Ok(serde_json::from_str(&envelope.book)?)
}

/// Replace `path` with `bytes` through a fsynced temporary file
pub(crate) fn write_durably(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = path.with_extension(TEMP_EXTENSION);
    {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    if let Some(dir) = path.parent() {
        sync_dir(dir);
    }
    Ok(())
}

/// Directory fsync is not supported everywhere; best effort
pub(crate) fn sync_dir(dir: &Path) {
    if let Ok(handle) = OpenOptions::new().read(true).open(dir) {
        let _ = handle.sync_all();
    }
}

/// Book store keeping one checksummed file per record
#[derive(Debug)]
pub struct FileBookStorage {
    root: PathBuf,
    logger: Logger,
}

impl FileBookStorage {
    /// Open (creating if needed) the store rooted at `root`
    pub fn open(root: impl Into<PathBuf>, logger: Logger) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, logger })
    }

    fn record_path(&self, id: &str) -> StorageResult<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StorageError::Internal(format!("invalid book id for record: {:?}", id)));
        }
        Ok(self
            .root
            .join(format!("{}.{}", id.replace(':', "_"), RECORD_EXTENSION)))
    }

    fn write_record(&self, id: &str, book: &Book) -> StorageResult<()> {
        let path = self.record_path(id)?;
        write_durably(&path, &seal_book(book)?)?;
        Ok(())
    }

    fn read_record(&self, path: &Path, id: &str) -> StorageResult<Book> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        open_book(&bytes, id)
    }

    fn record_files(&self) -> StorageResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

impl BookStorage for FileBookStorage {
    fn add(&self, id: &str, book: &Book) -> StorageResult<()> {
        self.write_record(id, book)
    }

    fn get_one(&self, id: &str) -> StorageResult<Book> {
        let path = self.record_path(id)?;
        self.read_record(&path, id)
    }

    /// Deleting a missing record is not an error
    fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(&self.root);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn update(&self, id: &str, book: &Book) -> StorageResult<Book> {
        self.write_record(id, book)?;
        Ok(book.clone())
    }

    /// Unreadable or corrupted records are logged and skipped
    fn get_all(&self) -> StorageResult<Vec<Book>> {
        let mut books = Vec::new();
        for path in self.record_files()? {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            match self.read_record(&path, &name) {
                Ok(book) => books.push(book),
                Err(err) => self.logger.error(
                    "storage: skipping unreadable book record",
                    &[("record", &name), ("error", &err.to_string())],
                ),
            }
        }
        Ok(books)
    }

    fn delete_all(&self) -> StorageResult<()> {
        for path in self.record_files()? {
            fs::remove_file(&path)?;
        }
        sync_dir(&self.root);
        Ok(())
    }
}
