use burn::record::RecorderError;

pub type Result<T, E = MaeError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum MaeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download of `{url}` failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("checkpoint inspection failed: {0}")]
    Checkpoint(#[from] candle_core::Error),

    #[error("expected an image with {expected} channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error("unknown architecture `{0}`")]
    UnknownArchitecture(String),

    #[error("mask ratio {0} is outside [0, 1)")]
    InvalidMaskRatio(f32),
}
