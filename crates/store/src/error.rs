use thiserror::Error;

/// Store-level error type.
///
/// Unknown-entity variants let the admin surface answer 404 instead of the
/// silent no-op a missing id would otherwise become.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown client '{0}'")]
    UnknownClient(String),

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown request '{0}'")]
    UnknownRequest(String),

    /// A user with the same OS account name already exists on the client.
    #[error("user with OS account name '{0}' already exists")]
    DuplicateUser(String),

    #[error("failed to persist client data: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode client data: {0}")]
    Encode(#[from] serde_json::Error),
}
