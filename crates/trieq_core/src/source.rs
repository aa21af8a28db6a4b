//! Upstream Audio Sources
//!
//! Defines the interface the render stage pulls audio from, plus two simple
//! generators that are handy for tests, benchmarks and the playback demo.

use std::f32::consts::TAU;

/// A producer of planar `f32` audio blocks
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `fill_next_block()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO unbounded loops
/// - Constant or O(n) time complexity where n = block size
///
/// Violating these rules causes audio dropouts ("glitches").
pub trait AudioSource: Send {
    /// Called before the first block and whenever the host's rate changes
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f32);

    /// Called when playback stops; the source may be prepared again later
    fn release_resources(&mut self);

    /// Write `num_samples` samples into the start of every channel slice
    ///
    /// Returns `false` when nothing was produced (end of stream). The caller
    /// treats that exactly like a missing source and outputs silence.
    fn fill_next_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> bool;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f32) {
        (**self).prepare_to_play(block_size, sample_rate);
    }

    fn release_resources(&mut self) {
        (**self).release_resources();
    }

    fn fill_next_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> bool {
        (**self).fill_next_block(channels, num_samples)
    }
}

/// Emits a constant (DC) value on every channel
///
/// With a length set, the source runs dry after that many samples per
/// channel; the block that crosses the end is zero-padded.
#[derive(Debug, Clone)]
pub struct ConstantSource {
    value: f32,
    remaining: Option<usize>,
}

impl ConstantSource {
    /// Endless DC source
    pub fn new(value: f32) -> Self {
        Self {
            value,
            remaining: None,
        }
    }

    /// DC source that ends after `length` samples
    pub fn with_length(value: f32, length: usize) -> Self {
        Self {
            value,
            remaining: Some(length),
        }
    }
}

impl AudioSource for ConstantSource {
    fn prepare_to_play(&mut self, _block_size: usize, _sample_rate: f32) {}

    fn release_resources(&mut self) {}

    fn fill_next_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> bool {
        let produced = match self.remaining {
            Some(0) => return false,
            Some(remaining) => remaining.min(num_samples),
            None => num_samples,
        };

        for channel in channels.iter_mut() {
            let n = num_samples.min(channel.len());
            let split = produced.min(n);
            channel[..split].fill(self.value);
            channel[split..n].fill(0.0);
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= produced;
        }
        true
    }
}

/// Sine generator, identical on every channel
#[derive(Debug, Clone)]
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: f32,
    phase: f32,
}

impl ToneSource {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            sample_rate: 44100.0,
            phase: 0.0,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl AudioSource for ToneSource {
    fn prepare_to_play(&mut self, _block_size: usize, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
    }

    fn release_resources(&mut self) {}

    fn fill_next_block(&mut self, channels: &mut [&mut [f32]], num_samples: usize) -> bool {
        let increment = TAU * self.frequency / self.sample_rate;
        let start_phase = self.phase;

        for channel in channels.iter_mut() {
            let n = num_samples.min(channel.len());
            let mut phase = start_phase;
            for sample in channel[..n].iter_mut() {
                *sample = phase.sin() * self.amplitude;
                phase = (phase + increment) % TAU;
            }
        }

        for _ in 0..num_samples {
            self.phase = (self.phase + increment) % TAU;
        }
        true
    }
}
