use thiserror::Error;

use crate::rating::types::ItemId;

pub type RatingResult<T> = Result<T, RatingError>;

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("failed to refresh {} item(s): {failed:?}", failed.len())]
    PartialBatchFailure { failed: Vec<ItemId> },
}

impl RatingError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RatingError::InvalidArgument(message.into())
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RatingError::StoreUnavailable(_))
    }
}

/// Add store context to an anyhow result and lift it into a `RatingError`
pub trait StoreContext<T> {
    fn store_context(self, operation: &str) -> RatingResult<T>;
}

impl<T> StoreContext<T> for anyhow::Result<T> {
    fn store_context(self, operation: &str) -> RatingResult<T> {
        self.map_err(|e| RatingError::StoreUnavailable(e.context(store_context(operation))))
    }
}

fn store_context(operation: &str) -> String {
    format!("Failed to {}", operation)
}
