//! Render Stage Configuration

use serde::{Deserialize, Serialize};
use trieq_dsp::{Design, FilterShape, MAX_ORDER, MIN_ORDER};

use crate::error::{EngineError, EngineResult};

/// The three logical EQ bands, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    /// Bands in the order they are applied to every block
    pub const ALL: [Band; 3] = [Band::Low, Band::Mid, Band::High];

    pub fn index(self) -> usize {
        match self {
            Band::Low => 0,
            Band::Mid => 1,
            Band::High => 2,
        }
    }

    /// Filter shape realizing this band
    pub fn shape(self) -> FilterShape {
        match self {
            Band::Low => FilterShape::LowShelf,
            Band::Mid => FilterShape::BandPass,
            Band::High => FilterShape::HighShelf,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Low => "low",
            Band::Mid => "mid",
            Band::High => "high",
        }
    }
}

/// Design points and initial gain of one band
///
/// A band starts at (`frequency`, `q`). The first gain change moves it to
/// (`tuned_frequency`, `tuned_q`), where it stays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub frequency: f32,
    pub q: f32,
    pub tuned_frequency: f32,
    pub tuned_q: f32,
    /// Linear gain (1.0 = unity)
    pub gain: f32,
    /// Sections per channel for this band
    pub order: usize,
}

impl BandConfig {
    pub fn default_for(band: Band) -> Self {
        let (frequency, tuned_frequency) = match band {
            Band::Low => (70.0, 500.0),
            Band::Mid => (1000.0, 2000.0),
            Band::High => (1300.0, 3500.0),
        };
        Self {
            frequency,
            q: 1.5,
            tuned_frequency,
            tuned_q: 1.0,
            gain: 1.0,
            order: MIN_ORDER,
        }
    }

    /// Design at the initial point
    pub fn initial_design(&self, band: Band) -> Design {
        Design::new(band.shape(), self.frequency, self.q, self.gain)
    }

    /// Design at the tuned point for a new gain
    pub fn tuned_design(&self, band: Band, gain: f32) -> Design {
        Design::new(band.shape(), self.tuned_frequency, self.tuned_q, gain)
    }

    fn validate(&self, band: Band, sample_rate: f32) -> EngineResult<()> {
        let nyquist = sample_rate / 2.0;
        for (what, frequency) in [("frequency", self.frequency), ("tuned_frequency", self.tuned_frequency)] {
            if !(frequency > 0.0 && frequency < nyquist) {
                return Err(EngineError::ConfigError(format!(
                    "{} band {} {}Hz outside (0, {}Hz)",
                    band.name(),
                    what,
                    frequency,
                    nyquist
                )));
            }
        }
        for (what, q) in [("q", self.q), ("tuned_q", self.tuned_q)] {
            if !(q.is_finite() && q > 0.0) {
                return Err(EngineError::ConfigError(format!(
                    "{} band {} must be positive, got {}",
                    band.name(),
                    what,
                    q
                )));
            }
        }
        if !(MIN_ORDER..=MAX_ORDER).contains(&self.order) {
            return Err(EngineError::ConfigError(format!(
                "{} band order {} outside {}-{}",
                band.name(),
                self.order,
                MIN_ORDER,
                MAX_ORDER
            )));
        }
        Ok(())
    }
}

/// Overall render stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Sample rate used until the first `prepare_to_play`
    pub sample_rate: f32,

    /// Number of channels that get filtered (1 = mono, 2 = stereo)
    pub channels: usize,

    /// Expected block size in frames
    pub block_size: usize,

    /// Low, mid and high band, in that order
    pub bands: [BandConfig; 3],
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            channels: 2,
            block_size: 512,
            bands: Band::ALL.map(BandConfig::default_for),
        }
    }
}

impl StageConfig {
    /// Default configuration with a different channel count
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    pub fn band(&self, band: Band) -> &BandConfig {
        &self.bands[band.index()]
    }

    pub fn band_mut(&mut self, band: Band) -> &mut BandConfig {
        &mut self.bands[band.index()]
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if !(8000.0..=192000.0).contains(&self.sample_rate) {
            return Err(EngineError::ConfigError(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(EngineError::ConfigError(format!(
                "Invalid channel count: {}",
                self.channels
            )));
        }
        if self.block_size < 32 || self.block_size > 8192 {
            return Err(EngineError::ConfigError(format!(
                "Invalid block size: {}",
                self.block_size
            )));
        }
        for band in Band::ALL {
            self.band(band).validate(band, self.sample_rate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StageConfig::default();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.channels, 2);
        assert_eq!(config.block_size, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_band_points() {
        let config = StageConfig::default();

        let low = config.band(Band::Low);
        assert_eq!((low.frequency, low.q), (70.0, 1.5));
        assert_eq!((low.tuned_frequency, low.tuned_q), (500.0, 1.0));

        let mid = config.band(Band::Mid);
        assert_eq!((mid.frequency, mid.tuned_frequency), (1000.0, 2000.0));

        let high = config.band(Band::High);
        assert_eq!((high.frequency, high.tuned_frequency), (1300.0, 3500.0));

        for band in &config.bands {
            assert_eq!(band.gain, 1.0);
            assert_eq!(band.order, 1);
        }
    }

    #[test]
    fn test_band_shapes_and_order() {
        assert_eq!(Band::Low.shape(), FilterShape::LowShelf);
        assert_eq!(Band::Mid.shape(), FilterShape::BandPass);
        assert_eq!(Band::High.shape(), FilterShape::HighShelf);

        let indices: Vec<usize> = Band::ALL.iter().map(|b| b.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_designs_follow_band_points() {
        let config = BandConfig::default_for(Band::High);

        let initial = config.initial_design(Band::High);
        assert_eq!(initial.shape, FilterShape::HighShelf);
        assert_eq!(initial.frequency, 1300.0);
        assert_eq!(initial.q, 1.5);

        let tuned = config.tuned_design(Band::High, 2.0);
        assert_eq!(tuned.frequency, 3500.0);
        assert_eq!(tuned.q, 1.0);
        assert_eq!(tuned.gain, 2.0);
    }

    #[test]
    fn test_validation() {
        let invalid_rate = StageConfig {
            sample_rate: 100.0,
            ..Default::default()
        };
        assert!(invalid_rate.validate().is_err());

        assert!(StageConfig::with_channels(0).validate().is_err());
        assert!(StageConfig::with_channels(9).validate().is_err());
        assert!(StageConfig::with_channels(1).validate().is_ok());

        let invalid_block = StageConfig {
            block_size: 10,
            ..Default::default()
        };
        assert!(invalid_block.validate().is_err());

        let mut above_nyquist = StageConfig::default();
        above_nyquist.band_mut(Band::High).tuned_frequency = 30000.0;
        assert!(above_nyquist.validate().is_err());

        let mut bad_q = StageConfig::default();
        bad_q.band_mut(Band::Mid).q = 0.0;
        assert!(bad_q.validate().is_err());

        let mut bad_order = StageConfig::default();
        bad_order.band_mut(Band::Low).order = 11;
        assert!(bad_order.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = StageConfig::with_channels(1);
        config.band_mut(Band::Mid).gain = 0.5;

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: StageConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config, deserialized);
    }
}
