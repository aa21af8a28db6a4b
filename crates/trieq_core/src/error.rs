//! Engine Error Types

use thiserror::Error;

/// Errors that can occur on the control path of the render stage
///
/// Nothing here is ever raised from inside `render_block`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("DSP error: {0}")]
    Dsp(#[from] trieq_dsp::DspError),

    #[error("Stage configuration error: {0}")]
    ConfigError(String),

    #[error("No audio output device found")]
    NoDevicesFound,

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
