use thiserror::Error;

/// A remote collection call that did not produce a usable response.
#[derive(Error, Debug)]
#[error("{operation} failed: {cause}")]
pub struct RemoteError {
    pub operation: String,
    #[source]
    pub cause: RemoteCause,
}

impl RemoteError {
    pub fn new(operation: impl Into<String>, cause: impl Into<RemoteCause>) -> Self {
        Self {
            operation: operation.into(),
            cause: cause.into(),
        }
    }

    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(operation, RemoteCause::Rejected(reason.into()))
    }

    pub fn status(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::new(
            operation,
            RemoteCause::Status {
                status,
                body: body.into(),
            },
        )
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.cause {
            RemoteCause::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RemoteCause {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Caller-side input problems, raised before any remote call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("folder name is required")]
    BlankFolderName,

    #[error("tag name is required")]
    BlankTagName,

    #[error("task title is required")]
    BlankTaskTitle,

    #[error("invalid tag color {0:?}; expected #rgb or #rrggbb")]
    InvalidTagColor(String),

    #[error("unknown folder: {0}")]
    UnknownFolder(String),

    #[error("unknown tag: {0}")]
    UnknownTag(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            StoreError::Remote(err) => Some(err),
            StoreError::Validation(_) => None,
        }
    }
}
