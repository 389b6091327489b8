use thiserror::Error;

/// All errors produced by cadence-core.
#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("invalid capture config: {0}")]
    InvalidConfig(String),

    #[error("engine is already listening")]
    AlreadyListening,

    #[error("engine is not listening — call start_listening() first")]
    NotListening,

    #[error("WAV encode error: {0}")]
    WavEncode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CadenceError>;
