//! trieq-play: a test tone through the three-band EQ on the default output
//!
//! Usage: `trieq-play [frequency_hz] [seconds]`
//!
//! Cycles the band gains while playing so each band can be heard.
//! Set `RUST_LOG` to override the default `trieq_core=debug` filter.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trieq_core::{Band, EngineResult, FilteringSource, PlaybackStream, ToneSource};

const BLOCK_SIZE: u32 = 512;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trieq_core=debug,trieq_play=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let frequency = args.next().and_then(|a| a.parse().ok()).unwrap_or(220.0);
    let seconds = args.next().and_then(|a| a.parse().ok()).unwrap_or(6_u64);

    if let Err(e) = run(frequency, seconds) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(frequency: f32, seconds: u64) -> EngineResult<()> {
    info!("Playing {}Hz for {}s", frequency, seconds);

    let stage = Arc::new(FilteringSource::new(
        Some(Box::new(ToneSource::new(frequency, 0.2))),
        2,
    )?);
    let _stream = PlaybackStream::open_default(Arc::clone(&stage), BLOCK_SIZE)?;

    // Boost one band at a time, then bypass for comparison
    let steps = [
        (Some(Band::Low), true),
        (Some(Band::Mid), true),
        (Some(Band::High), true),
        (None, false),
    ];
    let step = Duration::from_millis(seconds * 1000 / steps.len() as u64);

    for (boosted, enabled) in steps {
        for band in Band::ALL {
            let gain = if Some(band) == boosted { 4.0 } else { 0.5 };
            stage.set_band_gain(band, gain)?;
        }
        stage.set_filter_enabled(enabled);
        info!("{:?}", stage.snapshot());
        thread::sleep(step);
    }

    Ok(())
}
