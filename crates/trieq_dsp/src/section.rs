//! Biquad Section
//!
//! A single second-order IIR filter in Direct Form I. Owns its five
//! normalized coefficients and its own delay line; every channel needs its
//! own instance.
//!
//! Coefficient design follows the RBJ (Robert Bristow-Johnson) Audio EQ
//! Cookbook via the `biquad` crate. Gains passed in here are linear
//! multipliers and are converted to dB before they reach the designer.

use std::f32::consts::TAU;

use biquad::{Coefficients, ToHertz, Type, Q_BUTTERWORTH_F32};

use crate::error::DspError;

/// Smallest linear gain handed to the designer (-100 dB).
/// Zero or negative gains have no dB representation.
pub const MIN_LINEAR_GAIN: f32 = 1.0e-5;

/// Pass-through coefficients: y[n] = x[n]
pub const IDENTITY: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

/// Flatten coefficients as `[b0, b1, b2, a1, a2]`
pub fn coefficients_to_array(c: &Coefficients<f32>) -> [f32; 5] {
    [c.b0, c.b1, c.b2, c.a1, c.a2]
}

/// Shape of the frequency response a section is designed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterShape {
    LowPass,
    HighPass,
    LowShelf,
    HighShelf,
    BandPass,
    BandStop,
    PeakNotch,
    AllPass,
}

impl FilterShape {
    /// Whether the design's gain has any effect for this shape
    pub fn uses_gain(self) -> bool {
        matches!(
            self,
            FilterShape::LowShelf
                | FilterShape::HighShelf
                | FilterShape::BandPass
                | FilterShape::PeakNotch
        )
    }
}

/// A complete description of one coefficient design
///
/// Independent of sample rate; call [`Design::coefficients`] to realize it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Design {
    pub shape: FilterShape,
    pub frequency: f32,
    pub q: f32,
    /// Linear gain multiplier (ignored by shapes without gain)
    pub gain: f32,
}

impl Design {
    pub fn new(shape: FilterShape, frequency: f32, q: f32, gain: f32) -> Self {
        let gain = if shape.uses_gain() { gain } else { 1.0 };
        Self {
            shape,
            frequency,
            q,
            gain,
        }
    }

    pub fn low_pass(frequency: f32) -> Self {
        Self::new(FilterShape::LowPass, frequency, Q_BUTTERWORTH_F32, 1.0)
    }

    pub fn high_pass(frequency: f32) -> Self {
        Self::new(FilterShape::HighPass, frequency, Q_BUTTERWORTH_F32, 1.0)
    }

    pub fn low_shelf(frequency: f32, q: f32, gain: f32) -> Self {
        Self::new(FilterShape::LowShelf, frequency, q, gain)
    }

    pub fn high_shelf(frequency: f32, q: f32, gain: f32) -> Self {
        Self::new(FilterShape::HighShelf, frequency, q, gain)
    }

    pub fn band_pass(frequency: f32, q: f32, gain: f32) -> Self {
        Self::new(FilterShape::BandPass, frequency, q, gain)
    }

    pub fn band_stop(frequency: f32, q: f32) -> Self {
        Self::new(FilterShape::BandStop, frequency, q, 1.0)
    }

    pub fn peak_notch(centre_frequency: f32, q: f32, gain: f32) -> Self {
        Self::new(FilterShape::PeakNotch, centre_frequency, q, gain)
    }

    pub fn allpass(frequency: f32, q: f32) -> Self {
        Self::new(FilterShape::AllPass, frequency, q, 1.0)
    }

    /// Same shape and design point, different gain
    pub fn with_gain(self, gain: f32) -> Self {
        Self::new(self.shape, self.frequency, self.q, gain)
    }

    /// Compute normalized coefficients for this design at `sample_rate`
    pub fn coefficients(&self, sample_rate: f32) -> Result<Coefficients<f32>, DspError> {
        validate_params(sample_rate, self.frequency, self.q)?;

        let gain = clamp_gain(self.gain);
        let gain_db = 20.0 * gain.log10();

        let filter = match self.shape {
            FilterShape::LowPass => Some(Type::LowPass),
            FilterShape::HighPass => Some(Type::HighPass),
            FilterShape::LowShelf => Some(Type::LowShelf(gain_db)),
            FilterShape::HighShelf => Some(Type::HighShelf(gain_db)),
            FilterShape::BandPass => None,
            FilterShape::BandStop => Some(Type::Notch),
            FilterShape::PeakNotch => Some(Type::PeakingEQ(gain_db)),
            FilterShape::AllPass => Some(Type::AllPass),
        };

        let invalid = || DspError::InvalidCoefficients {
            frequency: self.frequency,
            sample_rate,
        };

        let coeffs = match filter {
            Some(filter) => Coefficients::<f32>::from_params(
                filter,
                sample_rate.hz(),
                self.frequency.hz(),
                self.q,
            )
            .map_err(|_| invalid())?,
            None => band_pass(sample_rate, self.frequency, self.q, gain),
        };

        if coefficients_to_array(&coeffs).iter().all(|c| c.is_finite()) {
            Ok(coeffs)
        } else {
            Err(invalid())
        }
    }
}

/// RBJ band-pass with a 0 dB peak, feed-forward path scaled by `gain`
///
/// `Type::BandPass` from `biquad` is the constant-skirt variant, whose peak
/// gain equals Q, so it is not used here.
fn band_pass(sample_rate: f32, frequency: f32, q: f32, gain: f32) -> Coefficients<f32> {
    let omega = TAU * frequency / sample_rate;
    let alpha = omega.sin() / (2.0 * q);
    let a0 = 1.0 + alpha;
    let b0 = gain * alpha / a0;

    Coefficients {
        a1: -2.0 * omega.cos() / a0,
        a2: (1.0 - alpha) / a0,
        b0,
        b1: 0.0,
        b2: -b0,
    }
}

#[inline]
fn clamp_gain(gain: f32) -> f32 {
    // f32::max ignores a NaN operand, so NaN also lands on the floor
    gain.max(MIN_LINEAR_GAIN)
}

fn validate_params(sample_rate: f32, frequency: f32, q: f32) -> Result<(), DspError> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if !(frequency > 0.0 && frequency < sample_rate / 2.0) {
        return Err(DspError::InvalidFrequency {
            frequency,
            sample_rate,
        });
    }
    if !(q.is_finite() && q > 0.0) {
        return Err(DspError::InvalidQ(q));
    }
    Ok(())
}

/// Delay line of a Direct Form I section: two past inputs, two past outputs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DelayLine {
    pub x1: f32,
    pub x2: f32,
    pub y1: f32,
    pub y2: f32,
}

/// One second-order filter section
///
/// Not internally synchronized. Callers decide how sections are shared
/// between threads.
#[derive(Debug, Clone, Copy)]
pub struct BiquadSection {
    coeffs: Coefficients<f32>,
    state: DelayLine,
}

impl Default for BiquadSection {
    fn default() -> Self {
        Self::new()
    }
}

impl BiquadSection {
    /// Create a pass-through section with a silent delay line
    pub fn new() -> Self {
        Self {
            coeffs: IDENTITY,
            state: DelayLine::default(),
        }
    }

    pub fn design_low_pass(&mut self, sample_rate: f32, frequency: f32) -> Result<(), DspError> {
        self.design(sample_rate, Design::low_pass(frequency))
    }

    pub fn design_high_pass(&mut self, sample_rate: f32, frequency: f32) -> Result<(), DspError> {
        self.design(sample_rate, Design::high_pass(frequency))
    }

    pub fn design_low_shelf(
        &mut self,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.design(sample_rate, Design::low_shelf(frequency, q, gain))
    }

    pub fn design_high_shelf(
        &mut self,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.design(sample_rate, Design::high_shelf(frequency, q, gain))
    }

    pub fn design_band_pass(
        &mut self,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.design(sample_rate, Design::band_pass(frequency, q, gain))
    }

    pub fn design_band_stop(&mut self, sample_rate: f32, frequency: f32, q: f32) -> Result<(), DspError> {
        self.design(sample_rate, Design::band_stop(frequency, q))
    }

    pub fn design_peak_notch(
        &mut self,
        sample_rate: f32,
        centre_frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.design(sample_rate, Design::peak_notch(centre_frequency, q, gain))
    }

    pub fn design_allpass(&mut self, sample_rate: f32, frequency: f32, q: f32) -> Result<(), DspError> {
        self.design(sample_rate, Design::allpass(frequency, q))
    }

    /// Apply any design. Coefficients are replaced only if the design is valid;
    /// the delay line is never touched.
    pub fn design(&mut self, sample_rate: f32, design: Design) -> Result<(), DspError> {
        self.coeffs = design.coefficients(sample_rate)?;
        Ok(())
    }

    /// Run one sample through the difference equation and advance the delay line
    #[inline]
    pub fn process_single_sample(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let s = &mut self.state;

        let y = c.b0 * x + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;

        s.x2 = s.x1;
        s.x1 = x;
        s.y2 = s.y1;
        s.y1 = y;
        y
    }

    /// Filter a block in place
    ///
    /// Same arithmetic, in the same order, as calling
    /// [`process_single_sample`](Self::process_single_sample) per sample, so
    /// results are bit-identical. The delay line is kept in locals for the loop.
    #[inline]
    pub fn process_samples(&mut self, samples: &mut [f32]) {
        let Coefficients { a1, a2, b0, b1, b2, .. } = self.coeffs;
        let DelayLine {
            mut x1,
            mut x2,
            mut y1,
            mut y2,
        } = self.state;

        for sample in samples.iter_mut() {
            let x = *sample;
            let y = b0 * x + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            *sample = y;
        }

        self.state = DelayLine { x1, x2, y1, y2 };
    }

    /// Copy the five coefficients of `other`, leaving the delay line alone
    pub fn copy_coefficients_from(&mut self, other: &BiquadSection) {
        self.coeffs = other.coeffs;
    }

    /// Copy the four delay-line values of `other`, leaving coefficients alone
    pub fn copy_outputs_from(&mut self, other: &BiquadSection) {
        self.state = other.state;
    }

    pub fn coefficients(&self) -> Coefficients<f32> {
        self.coeffs
    }

    pub fn set_coefficients(&mut self, coefficients: Coefficients<f32>) {
        self.coeffs = coefficients;
    }

    pub fn state(&self) -> DelayLine {
        self.state
    }

    /// Clear the delay line; coefficients are kept
    pub fn reset(&mut self) {
        self.state = DelayLine::default();
    }
}
