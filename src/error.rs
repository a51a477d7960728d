pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source metadata is missing required fields or is malformed.
    #[error("invalid metadata: {0}")]
    Metadata(String),
    /// Shape, scaling or level count cannot produce a valid pyramid.
    #[error("invalid geometry: {0}")]
    Geometry(String),
    /// The source data type has no float32 interpretation.
    #[error("cannot coerce source data type to float32: {0}")]
    TypeCoercion(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// An error raised by the underlying chunked array store.
    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error>),
}

impl Error {
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }

    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry(message.into())
    }

    pub fn type_coercion(message: impl Into<String>) -> Self {
        Self::TypeCoercion(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn storage(error: impl std::error::Error + 'static) -> Self {
        Self::Storage(Box::new(error))
    }
}
