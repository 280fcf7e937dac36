use thiserror::Error;

/// error type for everything the optimizer and its collaborators can fail on
#[derive(Debug, Error)]
pub enum Error {
    #[error("export context required")]
    MissingExportContext,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("raster error: {0}")]
    Raster(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
