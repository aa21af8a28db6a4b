//! Playback Through the Default Output Device
//!
//! Drives a [`FilteringSource`] from a CPAL output callback. CPAL hands us
//! interleaved frames; the stage works on planar channels, so the callback
//! renders into preallocated planar scratch and interleaves the result.
//!
//! ```text
//!  upstream ──▶ FilteringSource::render_block ──▶ scratch (planar)
//!                                                   │ interleave
//!                                                   ▼
//!                                              CPAL device buffer
//! ```

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::filtering::FilteringSource;

/// Highest channel count a stage can be configured with
const MAX_CHANNELS: usize = 8;

/// An open output stream pulling from a filtering stage
pub struct PlaybackStream {
    /// The underlying CPAL stream (kept alive to maintain audio flow)
    stream: Stream,

    stage: Arc<FilteringSource>,
    sample_rate: u32,
    block_size: usize,
}

impl PlaybackStream {
    /// Open the system's default output device and start playing
    pub fn open_default(stage: Arc<FilteringSource>, block_size: u32) -> EngineResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoDevicesFound)?;
        Self::open(&device, stage, block_size)
    }

    /// Open `device` at its default sample rate and start playing
    ///
    /// Prepares the stage for the device's rate before the stream starts.
    pub fn open(device: &Device, stage: Arc<FilteringSource>, block_size: u32) -> EngineResult<Self> {
        let default_config = device
            .default_output_config()
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;
        let sample_rate = default_config.sample_rate().0;
        let channels = stage.channels();

        let cpal_config = CpalStreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(block_size),
        };

        stage.prepare_to_play(block_size as usize, sample_rate as f32)?;

        let stream = Self::build_output_stream(
            device,
            &cpal_config,
            Arc::clone(&stage),
            block_size as usize,
        )?;

        stream
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;

        info!(
            "Playback started on {}: {}Hz, {} channel(s), {} frames per block",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            sample_rate,
            channels,
            block_size
        );

        Ok(Self {
            stream,
            stage,
            sample_rate,
            block_size: block_size as usize,
        })
    }

    fn build_output_stream(
        device: &Device,
        config: &CpalStreamConfig,
        stage: Arc<FilteringSource>,
        block_size: usize,
    ) -> EngineResult<Stream> {
        let channels = config.channels as usize;
        // Rust pattern: `move` closure captures the scratch by value, so the
        // callback owns it and never allocates
        let mut scratch = vec![0.0_f32; channels * block_size.max(1)];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    render_interleaved(&stage, &mut scratch, data, channels);
                },
                move |err| {
                    error!("Output stream error: {}", err);
                },
                None, // No timeout
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(stream)
    }

    pub fn stage(&self) -> &Arc<FilteringSource> {
        &self.stage
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Drop for PlaybackStream {
    fn drop(&mut self) {
        // Stop callbacks before the source is released underneath them
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause output stream: {}", e);
        }
        self.stage.release_resources();
        info!("Playback stopped");
    }
}

/// Fill an interleaved device buffer from `stage`
///
/// `scratch` holds `channels` planes of equal length; device buffers larger
/// than one plane are rendered in several passes.
fn render_interleaved(
    stage: &FilteringSource,
    scratch: &mut [f32],
    data: &mut [f32],
    channels: usize,
) {
    if channels == 0 || channels > MAX_CHANNELS {
        data.fill(0.0);
        return;
    }

    let plane_len = scratch.len() / channels;
    if plane_len == 0 {
        data.fill(0.0);
        return;
    }

    for chunk in data.chunks_mut(plane_len * channels) {
        let frames = chunk.len() / channels;
        if frames == 0 {
            chunk.fill(0.0);
            continue;
        }

        let mut planes: [&mut [f32]; MAX_CHANNELS] = Default::default();
        for (plane, samples) in planes
            .iter_mut()
            .zip(scratch[..channels * frames].chunks_mut(frames))
        {
            *plane = samples;
        }

        stage.render_block(&mut planes[..channels], frames);

        for (i, frame) in chunk.chunks_mut(channels).enumerate() {
            for (sample, plane) in frame.iter_mut().zip(planes.iter()) {
                *sample = plane.get(i).copied().unwrap_or(0.0);
            }
        }
    }
}
