//! Book record and the storage capability

use serde::{Deserialize, Serialize};

use super::errors::StorageResult;

/// A book. Every field is a string; `id` carries the `b:` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub price: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    /// Record carrying only an id (deletion events)
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// First required field left empty by a creation request
    pub fn missing_for_create(&self) -> Option<&'static str> {
        [
            ("title", &self.title),
            ("description", &self.description),
            ("author", &self.author),
            ("price", &self.price),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }

    /// First required field left empty by an update request
    pub fn missing_for_update(&self) -> Option<&'static str> {
        self.missing_for_create().or(if self.id.is_empty() {
            Some("id")
        } else if self.created_at.is_empty() {
            Some("created_at")
        } else {
            None
        })
    }
}

/// Operations a storage tier offers on books
///
/// Implementations are internally synchronized.
pub trait BookStorage: Send + Sync {
    /// Store `book` under `id`
    fn add(&self, id: &str, book: &Book) -> StorageResult<()>;

    /// Book stored under `id`, or [`StorageError::NotFound`]
    ///
    /// [`StorageError::NotFound`]: super::StorageError::NotFound
    fn get_one(&self, id: &str) -> StorageResult<Book>;

    /// Remove the book stored under `id`
    fn delete(&self, id: &str) -> StorageResult<()>;

    /// Replace (or insert) the book stored under `id`
    fn update(&self, id: &str, book: &Book) -> StorageResult<Book>;

    /// Every stored book, in no particular order
    fn get_all(&self) -> StorageResult<Vec<Book>>;

    /// Remove every book
    fn delete_all(&self) -> StorageResult<()>;
}
