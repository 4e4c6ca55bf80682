use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecompressError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormatError(String),

    #[error("Invalid quality: {0}")]
    InvalidQualityError(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometryError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`RecompressError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl RecompressError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create an unsupported format error (pixel format or source filter).
    unsupported_format => UnsupportedFormatError,
    /// Create an invalid quality error.
    invalid_quality => InvalidQualityError,
    /// Create an invalid geometry error.
    invalid_geometry => InvalidGeometryError,
    /// Create an encode error.
    encode => EncodeError,
    /// Create a document backend error.
    backend => BackendError,
    /// Create a cache error.
    cache => CacheError,
}

impl From<lopdf::Error> for RecompressError {
    fn from(e: lopdf::Error) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<serde_json::Error> for RecompressError {
    fn from(e: serde_json::Error) -> Self {
        Self::CacheError(e.to_string())
    }
}

impl From<serde_yml::Error> for RecompressError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<image::ImageError> for RecompressError {
    fn from(e: image::ImageError) -> Self {
        Self::EncodeError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecompressError>;
