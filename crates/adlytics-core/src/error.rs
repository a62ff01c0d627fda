use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// An input bundle must hold exactly three log blocks.
    #[error("malformed bundle: expected 3 entries, found {found}")]
    MalformedBundle { found: usize },

    /// A bundle entry that is not a readable UTF-8 text file.
    #[error("invalid bundle entry {entry}: {reason}")]
    InvalidBundleEntry { entry: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
