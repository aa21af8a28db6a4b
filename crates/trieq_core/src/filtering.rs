//! Real-Time Filtering Stage
//!
//! Wraps an upstream [`AudioSource`] and runs a three-band EQ (low shelf,
//! band-pass, high shelf) over every block it produces.
//!
//! # Threading
//!
//! ```text
//!  control thread                         render thread
//!  ──────────────                         ─────────────
//!  set_*_gain ─ design coeffs ─▶ mailbox ──try_lock──▶ render_block
//!  set_filter_enabled ─────────▶ atomic  ────load────▶    │
//!  prepare_to_play ──┐                                    │
//!  release_resources ┼──────── render lock ◀──────────────┘
//!  set_band_order ───┘
//! ```
//!
//! Structural changes take the render lock, a `parking_lot::Mutex` held only
//! for O(block size) work. Gain changes never take it: the control thread
//! builds the complete coefficient set and drops it into a per-band
//! latest-wins mailbox. The render thread collects mailboxes with `try_lock`
//! at the start of each block, so a half-written coefficient set is never
//! observed and the render thread never waits on the control thread.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use trieq_dsp::{Cascade, Coefficients, Design, DspError};

use crate::config::{Band, StageConfig};
use crate::error::EngineResult;
use crate::snapshot::{BandStatus, StageSnapshot};
use crate::source::AudioSource;

/// `f32` in an `AtomicU32`
///
/// Rust pattern: AtomicF32 doesn't exist, so we use bit-casting
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A coefficient set built on the control thread
#[derive(Debug, Clone, Copy)]
struct PendingDesign {
    sample_rate: f32,
    design: Design,
    coefficients: Coefficients<f32>,
}

/// One band's filters: a cascade per channel, all carrying the same design
struct BandFilters {
    design: Design,
    channels: Vec<Cascade>,
}

impl BandFilters {
    fn new(channels: usize, order: usize, sample_rate: f32, design: Design) -> Result<Self, DspError> {
        let coefficients = design.coefficients(sample_rate)?;
        let mut filters = Self {
            design,
            channels: (0..channels)
                .map(|_| {
                    let mut cascade = Cascade::new();
                    cascade.set_order(order);
                    cascade
                })
                .collect(),
        };
        filters.install(sample_rate, design, coefficients);
        Ok(filters)
    }

    /// Write one coefficient set to every channel
    fn install(&mut self, sample_rate: f32, design: Design, coefficients: Coefficients<f32>) {
        for cascade in &mut self.channels {
            cascade.apply_coefficients(sample_rate, design, coefficients);
        }
        self.design = design;
    }

    fn set_order(&mut self, order: usize) -> usize {
        let mut effective = order;
        for cascade in &mut self.channels {
            effective = cascade.set_order(order);
        }
        effective
    }

    fn order(&self) -> usize {
        self.channels.first().map_or(0, Cascade::order)
    }

    fn sample_rate(&self) -> Option<f32> {
        self.channels.first().and_then(Cascade::design_sample_rate)
    }

    /// Filter the first `num_samples` of each configured channel in place
    #[inline]
    fn process(&mut self, channels: &mut [&mut [f32]], num_samples: usize) {
        for (cascade, channel) in self.channels.iter_mut().zip(channels.iter_mut()) {
            let n = num_samples.min(channel.len());
            cascade.process_samples(&mut channel[..n]);
        }
    }

    fn reset(&mut self) {
        for cascade in &mut self.channels {
            cascade.reset();
        }
    }
}

/// Everything the render lock protects
struct RenderState {
    source: Option<Box<dyn AudioSource>>,
    bands: [BandFilters; 3],
    sample_rate: f32,
    block_size: usize,
    prepared: bool,
}

/// Lock-free (from the render thread's side) parameter surface
struct Controls {
    gains: [AtomicF32; 3],
    filter_enabled: AtomicBool,
    sample_rate: AtomicF32,
    mailboxes: [Mutex<Option<PendingDesign>>; 3],
}

/// Three-band EQ stage over an upstream audio source
///
/// Share it between the control and render threads behind an `Arc`; every
/// method takes `&self`.
pub struct FilteringSource {
    render: Mutex<RenderState>,
    controls: Controls,
    config: StageConfig,
}

impl FilteringSource {
    /// Create a stage with the default band layout at 44.1kHz
    pub fn new(source: Option<Box<dyn AudioSource>>, channels: usize) -> EngineResult<Self> {
        Self::with_config(source, StageConfig::with_channels(channels))
    }

    /// Create a stage from a custom configuration
    pub fn with_config(source: Option<Box<dyn AudioSource>>, config: StageConfig) -> EngineResult<Self> {
        config.validate()?;

        let sample_rate = config.sample_rate;
        let build = |band: Band| {
            let band_config = config.band(band);
            BandFilters::new(
                config.channels,
                band_config.order,
                sample_rate,
                band_config.initial_design(band),
            )
        };
        let bands = [build(Band::Low)?, build(Band::Mid)?, build(Band::High)?];

        info!(
            "Filtering stage created: {} channel(s) at {}Hz",
            config.channels, sample_rate
        );

        Ok(Self {
            render: Mutex::new(RenderState {
                source,
                bands,
                sample_rate,
                block_size: config.block_size,
                prepared: false,
            }),
            controls: Controls {
                gains: Band::ALL.map(|band| AtomicF32::new(config.band(band).gain)),
                filter_enabled: AtomicBool::new(true),
                sample_rate: AtomicF32::new(sample_rate),
                mailboxes: Default::default(),
            },
            config,
        })
    }

    /// Redesign every band for `sample_rate` and prepare the upstream source
    ///
    /// Must be called before the first `render_block` and whenever the
    /// host's sample rate changes. If any band cannot be designed at the new
    /// rate nothing is changed.
    ///
    /// Each band is redesigned at the point it currently sits on. A band that
    /// a gain change has moved to its tuned frequency and Q stays there; it is
    /// not returned to its initial point.
    pub fn prepare_to_play(&self, block_size: usize, sample_rate: f32) -> EngineResult<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate).into());
        }

        let mut guard = self.render.lock();
        let state = &mut *guard;

        // Design everything before committing anything
        let mut plans = Vec::with_capacity(Band::ALL.len());
        for band in Band::ALL {
            let i = band.index();
            let pending = *self.controls.mailboxes[i].lock();
            let design = pending.map_or(state.bands[i].design, |p| p.design);
            plans.push((design, design.coefficients(sample_rate)?));
        }

        for (filters, (design, coefficients)) in state.bands.iter_mut().zip(plans) {
            filters.install(sample_rate, design, coefficients);
        }

        state.sample_rate = sample_rate;
        state.block_size = block_size;
        state.prepared = true;
        self.controls.sample_rate.store(sample_rate);

        if let Some(source) = state.source.as_mut() {
            source.prepare_to_play(block_size, sample_rate);
        }

        info!(
            "Filtering stage prepared: {}Hz, {} samples per block",
            sample_rate, block_size
        );
        Ok(())
    }

    /// Release the upstream source; filter state is kept for reuse
    pub fn release_resources(&self) {
        let mut state = self.render.lock();
        if let Some(source) = state.source.as_mut() {
            source.release_resources();
        }
        state.prepared = false;
        debug!("Filtering stage released");
    }

    /// Swap the upstream source, handing the previous one back
    ///
    /// A new source is prepared straight away if the stage is prepared; the
    /// old one is released before it is returned.
    pub fn set_source(&self, source: Option<Box<dyn AudioSource>>) -> Option<Box<dyn AudioSource>> {
        let mut state = self.render.lock();
        let prepared = state.prepared;
        let (block_size, sample_rate) = (state.block_size, state.sample_rate);

        let mut previous = std::mem::replace(&mut state.source, source);
        if prepared {
            if let Some(old) = previous.as_mut() {
                old.release_resources();
            }
            if let Some(new) = state.source.as_mut() {
                new.prepare_to_play(block_size, sample_rate);
            }
        }

        info!(
            "Upstream source {}",
            if state.source.is_some() { "attached" } else { "detached" }
        );
        previous
    }

    pub fn has_source(&self) -> bool {
        self.render.lock().source.is_some()
    }

    pub fn set_low_gain(&self, gain: f32) -> EngineResult<()> {
        self.set_band_gain(Band::Low, gain)
    }

    pub fn set_mid_gain(&self, gain: f32) -> EngineResult<()> {
        self.set_band_gain(Band::Mid, gain)
    }

    pub fn set_high_gain(&self, gain: f32) -> EngineResult<()> {
        self.set_band_gain(Band::High, gain)
    }

    /// Change a band's linear gain
    ///
    /// Moves the band to its tuned design point. The coefficients are built
    /// here, on the calling thread, and picked up by the next rendered block.
    /// Does not take the render lock.
    pub fn set_band_gain(&self, band: Band, gain: f32) -> EngineResult<()> {
        let i = band.index();
        let sample_rate = self.controls.sample_rate.load();
        let design = self.config.band(band).tuned_design(band, gain);

        let coefficients = match design.coefficients(sample_rate) {
            Ok(coefficients) => coefficients,
            Err(e) => {
                warn!("Rejected {} gain {}: {}", band.name(), gain, e);
                return Err(e.into());
            }
        };

        self.controls.gains[i].store(gain);
        *self.controls.mailboxes[i].lock() = Some(PendingDesign {
            sample_rate,
            design,
            coefficients,
        });

        debug!("Set {} gain to {}", band.name(), gain);
        Ok(())
    }

    /// Turn filtering on or off; when off, upstream audio passes unmodified
    pub fn set_filter_enabled(&self, enabled: bool) {
        self.controls.filter_enabled.store(enabled, Ordering::Relaxed);
        debug!("Set filter enabled: {}", enabled);
    }

    /// Change the number of cascaded sections for one band on every channel
    ///
    /// Returns the order in effect after clamping.
    pub fn set_band_order(&self, band: Band, order: usize) -> usize {
        let effective = self.render.lock().bands[band.index()].set_order(order);
        debug!("Set {} band order to {}", band.name(), effective);
        effective
    }

    /// Clear every delay line; coefficients are kept
    pub fn reset(&self) {
        let mut state = self.render.lock();
        for filters in &mut state.bands {
            filters.reset();
        }
    }

    /// Render one block into `channels`
    ///
    /// Pulls `num_samples` from upstream, then applies the low, mid and high
    /// bands in that order to each configured channel. Without a source, or
    /// once the source runs dry, the block is silent. Channels beyond the
    /// configured count are left as the source wrote them.
    ///
    /// # Real-time Safety
    /// No allocations, no logging. The only lock is the render lock, which
    /// other holders keep for bounded time.
    pub fn render_block(&self, channels: &mut [&mut [f32]], num_samples: usize) {
        self.render(channels, num_samples);
    }

    /// Returns whether the upstream source produced this block
    fn render(&self, channels: &mut [&mut [f32]], num_samples: usize) -> bool {
        let mut guard = self.render.lock();
        let state = &mut *guard;

        self.collect_pending(state);

        let produced = match state.source.as_mut() {
            Some(source) => source.fill_next_block(channels, num_samples),
            None => false,
        };

        if !produced {
            for channel in channels.iter_mut() {
                let n = num_samples.min(channel.len());
                channel[..n].fill(0.0);
            }
            return false;
        }

        if self.controls.filter_enabled.load(Ordering::Relaxed) {
            for filters in &mut state.bands {
                filters.process(channels, num_samples);
            }
        }
        true
    }

    /// Install whatever the control thread has published since the last block
    fn collect_pending(&self, state: &mut RenderState) {
        let sample_rate = state.sample_rate;

        for (mailbox, filters) in self.controls.mailboxes.iter().zip(state.bands.iter_mut()) {
            // A busy mailbox is simply collected on the next block
            let Some(pending) = mailbox.try_lock().and_then(|mut slot| slot.take()) else {
                continue;
            };

            if pending.sample_rate == sample_rate {
                filters.install(sample_rate, pending.design, pending.coefficients);
            } else if let Ok(coefficients) = pending.design.coefficients(sample_rate) {
                // Built against a rate that prepare_to_play has since replaced
                filters.install(sample_rate, pending.design, coefficients);
            }
        }
    }

    pub fn low_gain(&self) -> f32 {
        self.band_gain(Band::Low)
    }

    pub fn mid_gain(&self) -> f32 {
        self.band_gain(Band::Mid)
    }

    pub fn high_gain(&self) -> f32 {
        self.band_gain(Band::High)
    }

    pub fn band_gain(&self, band: Band) -> f32 {
        self.controls.gains[band.index()].load()
    }

    pub fn is_filter_enabled(&self) -> bool {
        self.controls.filter_enabled.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> f32 {
        self.controls.sample_rate.load()
    }

    pub fn channels(&self) -> usize {
        self.config.channels
    }

    /// Sections per channel currently active for `band`
    pub fn band_order(&self, band: Band) -> usize {
        self.render.lock().bands[band.index()].order()
    }

    /// What a band is currently running (as seen by the render thread)
    pub fn band_status(&self, band: Band) -> BandStatus {
        let state = self.render.lock();
        let filters = &state.bands[band.index()];
        BandStatus {
            band,
            design: filters.design,
            sample_rate: filters.sample_rate().unwrap_or(state.sample_rate),
            order: filters.order(),
        }
    }

    /// Read-only view for a UI
    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            low_gain: self.low_gain(),
            mid_gain: self.mid_gain(),
            high_gain: self.high_gain(),
            filter_enabled: self.is_filter_enabled(),
            sample_rate: self.sample_rate(),
            channels: self.channels(),
        }
    }
}

impl Drop for FilteringSource {
    fn drop(&mut self) {
        let state = self.render.get_mut();
        if state.prepared {
            if let Some(source) = state.source.as_mut() {
                source.release_resources();
            }
        }
    }
}

// A stage can feed another stage (or anything else that pulls a source)
impl AudioSource for FilteringSource {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f32) {
        if let Err(e) = FilteringSource::prepare_to_play(self, block_size, sample_rate) {
            warn!("Nested filtering stage failed to prepare: {}", e);
        }
    }

    fn release_resources(&mut self) {
        FilteringSource::release_resources(self);
    }

    fn fill_next_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> bool {
        self.render(channels, num_samples)
    }
}
