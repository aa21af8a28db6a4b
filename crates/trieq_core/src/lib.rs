//! trieq Core - Real-Time Three-Band EQ Stage
//!
//! This crate wraps an upstream audio source in a three-band equalizer:
//! - Pull-based source interface and a couple of test generators
//! - The filtering stage (low shelf, band-pass, high shelf per channel)
//! - Control-thread gain changes that never block the render thread
//! - Optional playback through the default output device (`playback` feature)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │   set_*_gain ──▶ designs coefficients ──▶ per-band mailbox  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ try_lock at block start
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Render Thread                          │
//! │   AudioSource ──▶ Low shelf ──▶ Band-pass ──▶ High shelf    │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod filtering;
mod snapshot;
mod source;
#[cfg(feature = "playback")]
mod stream;

pub use config::{Band, BandConfig, StageConfig};
pub use error::{EngineError, EngineResult};
pub use filtering::FilteringSource;
pub use snapshot::{BandStatus, StageSnapshot};
pub use source::{AudioSource, ConstantSource, ToneSource};
#[cfg(feature = "playback")]
pub use stream::PlaybackStream;

// Re-export DSP types for convenience
pub use trieq_dsp::{BiquadSection, Cascade, Design, DspError, FilterShape, MAX_ORDER, MIN_ORDER};
