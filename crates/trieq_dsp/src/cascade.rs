//! Cascaded Biquad Filter
//!
//! An ordered chain of biquad sections applied in series. Higher orders give
//! steeper roll-off. The order can change while audio is running: new
//! sections start from the coefficients and live delay line of the section
//! before them, so growing the chain does not click.
//!
//! Every section in a cascade carries the same design. The cascade remembers
//! the last design it applied and skips identical redesign requests, which
//! continuous controls tend to send in bursts.

use biquad::Coefficients;

use crate::error::DspError;
use crate::section::{BiquadSection, Design};

/// Lowest cascade order
pub const MIN_ORDER: usize = 1;

/// Highest cascade order
pub const MAX_ORDER: usize = 10;

/// A filter section a [`Cascade`] can be built from
///
/// All sections in a cascade are the same concrete type, so the chain is
/// statically dispatched.
pub trait Section: Default + Send {
    /// Overwrite the section's coefficients (one "design write")
    fn set_coefficients(&mut self, coefficients: Coefficients<f32>);

    /// Copy only the coefficients of `other`
    fn copy_coefficients_from(&mut self, other: &Self);

    /// Copy only the delay-line state of `other`
    fn copy_outputs_from(&mut self, other: &Self);

    fn process_single_sample(&mut self, sample: f32) -> f32;

    fn process_samples(&mut self, samples: &mut [f32]);

    /// Clear the delay line
    fn reset(&mut self);
}

impl Section for BiquadSection {
    fn set_coefficients(&mut self, coefficients: Coefficients<f32>) {
        BiquadSection::set_coefficients(self, coefficients);
    }

    fn copy_coefficients_from(&mut self, other: &Self) {
        BiquadSection::copy_coefficients_from(self, other);
    }

    fn copy_outputs_from(&mut self, other: &Self) {
        BiquadSection::copy_outputs_from(self, other);
    }

    #[inline]
    fn process_single_sample(&mut self, sample: f32) -> f32 {
        BiquadSection::process_single_sample(self, sample)
    }

    #[inline]
    fn process_samples(&mut self, samples: &mut [f32]) {
        BiquadSection::process_samples(self, samples);
    }

    fn reset(&mut self) {
        BiquadSection::reset(self);
    }
}

/// What the cascade was last designed for
///
/// Keyed on the whole design plus the sample rate. A shape change, Q change
/// or gain change at an unchanged frequency still redesigns.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DesignKey {
    sample_rate: f32,
    design: Design,
}

/// Variable-length chain of filter sections
#[derive(Debug, Clone)]
pub struct Cascade<S: Section = BiquadSection> {
    sections: Vec<S>,
    current: Option<DesignKey>,
}

impl<S: Section> Default for Cascade<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Section> Cascade<S> {
    /// Create an order-1 cascade holding one pass-through section
    pub fn new() -> Self {
        // Reserve the maximum up front so order changes never reallocate
        let mut sections = Vec::with_capacity(MAX_ORDER);
        sections.push(S::default());
        Self {
            sections,
            current: None,
        }
    }

    /// Number of active sections
    pub fn order(&self) -> usize {
        self.sections.len()
    }

    /// Change the number of sections, clamped to `MIN_ORDER..=MAX_ORDER`
    ///
    /// Growing seeds each new section from the one before it (coefficients
    /// and delay line). Shrinking drops sections from the tail.
    /// Returns the order actually in effect.
    pub fn set_order(&mut self, order: usize) -> usize {
        let order = order.clamp(MIN_ORDER, MAX_ORDER);

        while self.sections.len() < order {
            let mut section = S::default();
            if let Some(last) = self.sections.last() {
                section.copy_outputs_from(last);
                section.copy_coefficients_from(last);
            }
            self.sections.push(section);
        }
        self.sections.truncate(order);

        order
    }

    /// Run one sample through every section in order
    #[inline]
    pub fn process_single_sample(&mut self, sample: f32) -> f32 {
        self.sections
            .iter_mut()
            .fold(sample, |acc, section| section.process_single_sample(acc))
    }

    /// Filter a block in place; each section's output feeds the next
    #[inline]
    pub fn process_samples(&mut self, samples: &mut [f32]) {
        for section in &mut self.sections {
            section.process_samples(samples);
        }
    }

    /// Design every section for `design` at `sample_rate`
    ///
    /// Returns `Ok(false)` without touching any section when the request
    /// matches the last applied design.
    pub fn apply_design(&mut self, sample_rate: f32, design: Design) -> Result<bool, DspError> {
        let key = DesignKey {
            sample_rate,
            design,
        };
        if self.current == Some(key) {
            return Ok(false);
        }

        let coefficients = design.coefficients(sample_rate)?;
        self.write_coefficients(key, coefficients);
        Ok(true)
    }

    /// Install coefficients that were already computed for `design`
    ///
    /// Used when the design work happened on another thread. Same
    /// redundancy check as [`apply_design`](Self::apply_design).
    pub fn apply_coefficients(
        &mut self,
        sample_rate: f32,
        design: Design,
        coefficients: Coefficients<f32>,
    ) -> bool {
        let key = DesignKey {
            sample_rate,
            design,
        };
        if self.current == Some(key) {
            return false;
        }
        self.write_coefficients(key, coefficients);
        true
    }

    fn write_coefficients(&mut self, key: DesignKey, coefficients: Coefficients<f32>) {
        for section in &mut self.sections {
            section.set_coefficients(coefficients);
        }
        self.current = Some(key);
    }

    pub fn make_low_pass(&mut self, sample_rate: f32, frequency: f32) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::low_pass(frequency)).map(|_| ())
    }

    pub fn make_high_pass(&mut self, sample_rate: f32, frequency: f32) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::high_pass(frequency)).map(|_| ())
    }

    pub fn make_low_shelf(
        &mut self,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::low_shelf(frequency, q, gain))
            .map(|_| ())
    }

    pub fn make_high_shelf(
        &mut self,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::high_shelf(frequency, q, gain))
            .map(|_| ())
    }

    pub fn make_band_pass(
        &mut self,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::band_pass(frequency, q, gain))
            .map(|_| ())
    }

    pub fn make_band_stop(&mut self, sample_rate: f32, frequency: f32, q: f32) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::band_stop(frequency, q))
            .map(|_| ())
    }

    pub fn make_peak_notch(
        &mut self,
        sample_rate: f32,
        centre_frequency: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::peak_notch(centre_frequency, q, gain))
            .map(|_| ())
    }

    pub fn make_allpass(&mut self, sample_rate: f32, frequency: f32, q: f32) -> Result<(), DspError> {
        self.apply_design(sample_rate, Design::allpass(frequency, q))
            .map(|_| ())
    }

    /// Last applied design, if any
    pub fn design(&self) -> Option<Design> {
        self.current.map(|key| key.design)
    }

    /// Sample rate of the last applied design, if any
    pub fn design_sample_rate(&self) -> Option<f32> {
        self.current.map(|key| key.sample_rate)
    }

    pub fn section(&self, index: usize) -> Option<&S> {
        self.sections.get(index)
    }

    pub fn section_mut(&mut self, index: usize) -> Option<&mut S> {
        self.sections.get_mut(index)
    }

    /// Clear every section's delay line
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{coefficients_to_array, DelayLine, FilterShape};

    const SAMPLE_RATE: f32 = 44100.0;

    /// Biquad that counts coefficient writes
    #[derive(Default)]
    struct CountingSection {
        inner: BiquadSection,
        writes: usize,
    }

    impl Section for CountingSection {
        fn set_coefficients(&mut self, coefficients: Coefficients<f32>) {
            self.writes += 1;
            self.inner.set_coefficients(coefficients);
        }

        fn copy_coefficients_from(&mut self, other: &Self) {
            self.inner.copy_coefficients_from(&other.inner);
        }

        fn copy_outputs_from(&mut self, other: &Self) {
            self.inner.copy_outputs_from(&other.inner);
        }

        fn process_single_sample(&mut self, sample: f32) -> f32 {
            self.inner.process_single_sample(sample)
        }

        fn process_samples(&mut self, samples: &mut [f32]) {
            self.inner.process_samples(samples);
        }

        fn reset(&mut self) {
            self.inner.reset();
        }
    }

    fn noise(len: usize) -> Vec<f32> {
        // Deterministic LCG, values in [-0.5, 0.5)
        let mut seed = 0x1234_5678_u32;
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_new_cascade_is_order_one_passthrough() {
        let mut cascade: Cascade = Cascade::new();
        assert_eq!(cascade.order(), 1);
        assert!(cascade.design().is_none());

        let mut block = noise(128);
        let expected = block.clone();
        cascade.process_samples(&mut block);
        assert_eq!(block, expected);
    }

    #[test]
    fn test_order_is_clamped() {
        let mut cascade: Cascade = Cascade::new();
        assert_eq!(cascade.set_order(0), MIN_ORDER);
        assert_eq!(cascade.order(), 1);

        assert_eq!(cascade.set_order(42), MAX_ORDER);
        assert_eq!(cascade.order(), 10);

        assert_eq!(cascade.set_order(10), 10);
        assert_eq!(cascade.order(), 10);
    }

    #[test]
    fn test_redundant_design_writes_once() {
        let mut cascade: Cascade<CountingSection> = Cascade::new();

        cascade.make_low_pass(SAMPLE_RATE, 1000.0).unwrap();
        cascade.make_low_pass(SAMPLE_RATE, 1000.0).unwrap();

        assert_eq!(cascade.section(0).map(|s| s.writes), Some(1));
    }

    #[test]
    fn test_redesign_reaches_every_section() {
        let mut cascade: Cascade<CountingSection> = Cascade::new();
        cascade.set_order(4);
        cascade.make_band_pass(SAMPLE_RATE, 1000.0, 1.5, 1.0).unwrap();
        cascade.make_band_pass(SAMPLE_RATE, 2000.0, 1.5, 1.0).unwrap();

        for i in 0..4 {
            assert_eq!(cascade.section(i).map(|s| s.writes), Some(2));
        }
    }

    #[test]
    fn test_shape_change_at_same_frequency_redesigns() {
        let mut cascade: Cascade<CountingSection> = Cascade::new();
        cascade.make_band_pass(SAMPLE_RATE, 1000.0, 1.0, 1.0).unwrap();
        cascade.make_band_stop(SAMPLE_RATE, 1000.0, 1.0).unwrap();

        assert_eq!(cascade.section(0).map(|s| s.writes), Some(2));
        assert_eq!(cascade.design().map(|d| d.shape), Some(FilterShape::BandStop));
    }

    #[test]
    fn test_gain_and_rate_changes_redesign() {
        let mut cascade: Cascade<CountingSection> = Cascade::new();
        cascade.make_low_shelf(SAMPLE_RATE, 70.0, 1.5, 1.0).unwrap();
        cascade.make_low_shelf(SAMPLE_RATE, 70.0, 1.5, 2.0).unwrap();
        cascade.make_low_shelf(48000.0, 70.0, 1.5, 2.0).unwrap();

        assert_eq!(cascade.section(0).map(|s| s.writes), Some(3));
        assert_eq!(cascade.design_sample_rate(), Some(48000.0));
    }

    #[test]
    fn test_failed_design_keeps_previous() {
        let mut cascade: Cascade = Cascade::new();
        cascade.make_high_shelf(SAMPLE_RATE, 1300.0, 1.5, 1.0).unwrap();
        let before = cascade.design();

        assert!(cascade.make_high_shelf(SAMPLE_RATE, 30000.0, 1.5, 1.0).is_err());
        assert_eq!(cascade.design(), before);
    }

    #[test]
    fn test_growth_seeds_from_previous_section() {
        let mut cascade: Cascade = Cascade::new();
        cascade.make_low_shelf(SAMPLE_RATE, 200.0, 1.0, 3.0).unwrap();

        let mut block = noise(256);
        cascade.process_samples(&mut block);

        let first = *cascade.section(0).unwrap();
        let mut reference = first;

        cascade.set_order(2);
        let grown = *cascade.section(1).unwrap();
        assert_eq!(grown.state(), first.state());
        assert_eq!(
            coefficients_to_array(&grown.coefficients()),
            coefficients_to_array(&first.coefficients())
        );

        // The new section continues exactly where the order-1 filter left off
        let next = cascade.section_mut(1).unwrap().process_single_sample(0.0);
        assert_eq!(next.to_bits(), reference.process_single_sample(0.0).to_bits());
    }

    #[test]
    fn test_multi_step_growth_chains_copies() {
        let mut cascade: Cascade = Cascade::new();
        cascade.make_peak_notch(SAMPLE_RATE, 1000.0, 2.0, 0.5).unwrap();
        let mut block = noise(64);
        cascade.process_samples(&mut block);

        cascade.set_order(4);
        let state = cascade.section(0).unwrap().state();
        for i in 1..4 {
            assert_eq!(cascade.section(i).unwrap().state(), state);
        }
    }

    #[test]
    fn test_shrink_matches_fresh_cascade() {
        let design = Design::band_pass(1000.0, 1.5, 1.0);

        let mut shrunk: Cascade = Cascade::new();
        shrunk.set_order(5);
        shrunk.apply_design(SAMPLE_RATE, design).unwrap();
        let mut warmup = noise(300);
        shrunk.process_samples(&mut warmup);
        shrunk.set_order(2);
        assert_eq!(shrunk.order(), 2);

        let mut fresh: Cascade = Cascade::new();
        fresh.set_order(2);
        fresh.apply_design(SAMPLE_RATE, design).unwrap();
        for i in 0..2 {
            let held = *shrunk.section(i).unwrap();
            fresh.section_mut(i).unwrap().copy_outputs_from(&held);
        }

        let input = noise(128);
        let mut a = input.clone();
        let mut b = input;
        shrunk.process_samples(&mut a);
        fresh.process_samples(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_block_matches_single_sample() {
        let mut a: Cascade = Cascade::new();
        a.set_order(3);
        a.make_high_pass(SAMPLE_RATE, 300.0).unwrap();
        let mut b = a.clone();

        let mut block = noise(512);
        let singles: Vec<f32> = block.iter().map(|&x| b.process_single_sample(x)).collect();
        a.process_samples(&mut block);

        for (got, want) in block.iter().zip(&singles) {
            assert_eq!(got.to_bits(), want.to_bits());
        }
    }

    #[test]
    fn test_higher_order_is_steeper() {
        let tone = |cascade: &mut Cascade| {
            let mut peak = 0.0_f32;
            for i in 0..8192 {
                let x = (2.0 * std::f32::consts::PI * 8000.0 * i as f32 / SAMPLE_RATE).sin();
                let y = cascade.process_single_sample(x);
                if i > 4096 {
                    peak = peak.max(y.abs());
                }
            }
            peak
        };

        let mut first: Cascade = Cascade::new();
        first.make_low_pass(SAMPLE_RATE, 1000.0).unwrap();
        let mut fourth: Cascade = Cascade::new();
        fourth.set_order(4);
        fourth.make_low_pass(SAMPLE_RATE, 1000.0).unwrap();

        assert!(tone(&mut fourth) < tone(&mut first));
    }

    #[test]
    fn test_apply_coefficients_respects_cache() {
        let design = Design::allpass(500.0, 0.7);
        let coeffs = design.coefficients(SAMPLE_RATE).unwrap();

        let mut cascade: Cascade<CountingSection> = Cascade::new();
        assert!(cascade.apply_coefficients(SAMPLE_RATE, design, coeffs));
        assert!(!cascade.apply_coefficients(SAMPLE_RATE, design, coeffs));
        assert!(!cascade.apply_design(SAMPLE_RATE, design).unwrap());
        assert_eq!(cascade.section(0).map(|s| s.writes), Some(1));
    }

    #[test]
    fn test_reset_clears_all_sections() {
        let mut cascade: Cascade = Cascade::new();
        cascade.set_order(3);
        cascade.make_band_stop(SAMPLE_RATE, 60.0, 4.0).unwrap();
        let mut block = noise(64);
        cascade.process_samples(&mut block);

        cascade.reset();
        for i in 0..3 {
            assert_eq!(cascade.section(i).unwrap().state(), DelayLine::default());
        }
    }
}
