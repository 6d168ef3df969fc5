//! Error taxonomy shared by every layer of the core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HpiError {
    #[error("Malformed entity path: {0}")]
    MalformedPath(String),
    #[error("Entity path overflow: {len} segments exceeds capacity of {max}")]
    PathOverflow { len: usize, max: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Identifier space exhausted: {0}")]
    Exhausted(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HpiError {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, HpiError>;

/// Monotonic id allocator that refuses to wrap
///
/// The last id ever issued is `u32::MAX - 1`; the allocation that would
/// hand out `u32::MAX` reports `Exhausted` instead, and so does every one
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IdCounter {
    next: u32,
    what: &'static str,
}

impl IdCounter {
    pub(crate) fn starting_at(base: u32, what: &'static str) -> Self {
        Self { next: base, what }
    }

    pub(crate) fn allocate(&mut self) -> Result<u32> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or(HpiError::Exhausted(self.what))?;
        Ok(id)
    }

    pub(crate) fn peek(&self) -> u32 {
        self.next
    }
}
