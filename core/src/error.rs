use thiserror::Error;

/// Errors raised by shopping-list operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListError {
    /// A remove was issued for an item that has never been added to the
    /// list. Existence is checked against the add-set only, never against
    /// the net quantity.
    #[error("item '{0}' does not exist in this list")]
    ItemNotFound(String),

    /// Quantities must be strictly positive. Rejected at the boundary,
    /// before the operation reaches the CRDT.
    #[error("quantity {0} is not valid")]
    InvalidQuantity(i64),
}

/// Errors raised by the `Storage` collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt store file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors raised by the `MessageBus` collaborator.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bus encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("bus is not connected")]
    NotConnected,
}
