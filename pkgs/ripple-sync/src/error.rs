use ripple_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("only the sender may edit a message")]
    NotMessageSender,

    #[error("message text is empty")]
    EmptyMessage,
}
