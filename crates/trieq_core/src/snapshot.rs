//! Read-Only Views of the Render Stage
//!
//! Plain values copied out of a running stage for a UI or a log line.
//! Holding one never blocks the render thread.

use serde::{Deserialize, Serialize};
use trieq_dsp::Design;

use crate::config::Band;

/// Control-side parameter state of a stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    /// Linear gains (1.0 = unity)
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,

    /// When false, upstream audio passes through unmodified
    pub filter_enabled: bool,

    pub sample_rate: f32,
    pub channels: usize,
}

impl StageSnapshot {
    pub fn gain(&self, band: Band) -> f32 {
        match band {
            Band::Low => self.low_gain,
            Band::Mid => self.mid_gain,
            Band::High => self.high_gain,
        }
    }
}

/// What one band is running on the render side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStatus {
    pub band: Band,
    pub design: Design,
    /// Rate the installed coefficients were designed for
    pub sample_rate: f32,
    /// Sections per channel
    pub order: usize,
}
