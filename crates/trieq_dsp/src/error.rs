//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while designing filter coefficients
///
/// A design call that fails leaves the section or cascade untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("Frequency {frequency}Hz must lie strictly between 0 and Nyquist for sample rate {sample_rate}Hz")]
    InvalidFrequency { frequency: f32, sample_rate: f32 },

    #[error("Q must be positive and finite, got {0}")]
    InvalidQ(f32),

    #[error("Invalid filter coefficients for frequency {frequency}Hz at sample rate {sample_rate}Hz")]
    InvalidCoefficients { frequency: f32, sample_rate: f32 },
}
