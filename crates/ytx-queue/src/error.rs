//! Queue error types.

use thiserror::Error;
use ytx_models::{ItemId, QueueStatus};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Already queued: {0}")]
    Duplicate(String),

    #[error("Queue is full (maximum {0} items)")]
    Capacity(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Item {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ItemId,
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("Failed to persist queue: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn duplicate(input: impl Into<String>) -> Self {
        Self::Duplicate(input.into())
    }

    pub fn capacity(max_size: usize) -> Self {
        Self::Capacity(max_size)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn not_found(id: &ItemId) -> Self {
        Self::NotFound(id.clone())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, QueueError::Duplicate(_))
    }

    pub fn is_capacity(&self) -> bool {
        matches!(self, QueueError::Capacity(_))
    }
}
