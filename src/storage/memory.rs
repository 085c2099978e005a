//! In-memory primary tier

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::book::{Book, BookStorage};
use super::errors::{StorageError, StorageResult};

/// Low-latency book store backed by a map
#[derive(Debug, Default)]
pub struct MemoryBookStorage {
    books: RwLock<HashMap<String, Book>>,
}

impl MemoryBookStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Book>> {
        self.books.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Book>> {
        self.books.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of cached books
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl BookStorage for MemoryBookStorage {
    fn add(&self, id: &str, book: &Book) -> StorageResult<()> {
        self.write().insert(id.to_string(), book.clone());
        Ok(())
    }

    fn get_one(&self, id: &str) -> StorageResult<Book> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> StorageResult<()> {
        self.write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn update(&self, id: &str, book: &Book) -> StorageResult<Book> {
        self.write().insert(id.to_string(), book.clone());
        Ok(book.clone())
    }

    fn get_all(&self) -> StorageResult<Vec<Book>> {
        Ok(self.read().values().cloned().collect())
    }

    fn delete_all(&self) -> StorageResult<()> {
        self.write().clear();
        Ok(())
    }
}
