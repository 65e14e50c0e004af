use thiserror::Error;

use crate::format::AudioFormat;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(AudioFormat),

    #[error("stage {index} ({stage}) rejected format: {source}")]
    StageRejected {
        index: usize,
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("native engine initialization failed: {0}")]
    InitializationFailed(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{stage} native process failed with code {code}")]
    Process { stage: &'static str, code: i32 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("pipeline worker is no longer running")]
    PipelineClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors after which the owning session or processor must be rebuilt.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::UnsupportedFormat(_) | Error::InvalidData(_) => false,
            Error::StageRejected { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}
