//! Test pattern sender.
//!
//! Creates one sender, pushes colour bars with matching silent audio, and
//! reports tally and receiver counts while it runs.
//!
//! Environment:
//! - `NDISEND_NAME`: sender name (default "Pattern Sender")
//! - `NDISEND_FRAMES`: frames to send (default 300)
//! - `NDISEND_BACKEND`: `loopback` or `ndi` (default `loopback`)

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ndisend_engine::{create_sender, Scheduler, SchedulerConfig, Sender};
use ndisend_host::HostValue;
use ndisend_sdk::{AudioFourCc, LoopbackSdk, SendSdk, VideoFourCc};

const WIDTH: usize = 1280;
const HEIGHT: usize = 720;
const SAMPLE_RATE: i32 = 48000;
const CHANNELS: usize = 2;
const SAMPLES_PER_FRAME: usize = 1600;
const REPORT_INTERVAL: u64 = 30;

/// BGRX colour bars: white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 4]; 8] = [
    [0xEB, 0xEB, 0xEB, 0xFF],
    [0x10, 0xEB, 0xEB, 0xFF],
    [0xEB, 0xEB, 0x10, 0xFF],
    [0x10, 0xEB, 0x10, 0xFF],
    [0xEB, 0x10, 0xEB, 0xFF],
    [0x10, 0x10, 0xEB, 0xFF],
    [0xEB, 0x10, 0x10, 0xFF],
    [0x10, 0x10, 0x10, 0xFF],
];

/// Demo settings read from the environment.
struct Settings {
    name: String,
    frames: u64,
    backend: String,
}

impl Settings {
    fn from_env() -> Result<Self> {
        let frames = match env::var("NDISEND_FRAMES") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("NDISEND_FRAMES is not a number: {value}"))?,
            Err(_) => 300,
        };
        Ok(Self {
            name: env::var("NDISEND_NAME").unwrap_or_else(|_| "Pattern Sender".to_string()),
            frames,
            backend: env::var("NDISEND_BACKEND").unwrap_or_else(|_| "loopback".to_string()),
        })
    }
}

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "pattern_sender=debug,ndisend_engine=debug,ndisend_sdk=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_backend(backend: &str) -> Result<Arc<dyn SendSdk>> {
    match backend {
        "loopback" => Ok(Arc::new(LoopbackSdk::new())),
        #[cfg(feature = "ndi")]
        "ndi" => Ok(Arc::new(
            ndisend_sdk::NdiSdk::new().context("failed to load the NDI runtime")?,
        )),
        other => bail!("unknown backend '{other}'"),
    }
}

/// Render colour bars scrolled by `offset` bars.
fn colour_bars(offset: usize) -> Bytes {
    let stride = WIDTH * 4;
    let bar_width = WIDTH / BARS.len();
    let mut line = vec![0u8; stride];
    for (x, pixel) in line.chunks_exact_mut(4).enumerate() {
        let bar = (x / bar_width + offset) % BARS.len();
        pixel.copy_from_slice(&BARS[bar]);
    }

    let mut frame = Vec::with_capacity(stride * HEIGHT);
    for _ in 0..HEIGHT {
        frame.extend_from_slice(&line);
    }
    Bytes::from(frame)
}

fn video_frame(data: Bytes) -> HostValue {
    HostValue::object([
        ("xres", HostValue::from(WIDTH as u32)),
        ("yres", HostValue::from(HEIGHT as u32)),
        ("frameRateN", HostValue::from(30000)),
        ("frameRateD", HostValue::from(1001)),
        ("pictureAspectRatio", HostValue::from(16.0 / 9.0)),
        ("frameFormatType", HostValue::from(1)),
        ("lineStrideBytes", HostValue::from((WIDTH * 4) as u32)),
        ("fourCC", HostValue::from(VideoFourCc::Bgrx.code())),
        ("data", HostValue::from(data)),
    ])
}

fn audio_frame(data: Bytes) -> HostValue {
    HostValue::object([
        ("sampleRate", HostValue::from(SAMPLE_RATE)),
        ("noChannels", HostValue::from(CHANNELS as u32)),
        ("noSamples", HostValue::from(SAMPLES_PER_FRAME as u32)),
        (
            "channelStrideBytes",
            HostValue::from((SAMPLES_PER_FRAME * 4) as u32),
        ),
        ("fourCC", HostValue::from(AudioFourCc::Fltp.code())),
        ("data", HostValue::from(data)),
    ])
}

fn report(sender: &Sender) {
    match (sender.connections(), sender.tally()) {
        (Ok(connections), Ok(tally)) => info!(
            connections,
            on_program = tally.on_program,
            on_preview = tally.on_preview,
            changed = tally.changed,
            "Sender status"
        ),
        (Err(e), _) | (_, Err(e)) => warn!("Status query failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let settings = Settings::from_env()?;
    info!(name = %settings.name, backend = %settings.backend, frames = settings.frames, "Pattern sender starting");

    let sdk = open_backend(&settings.backend)?;
    let scheduler = Scheduler::new(SchedulerConfig::default())?;

    let config = HostValue::from(serde_json::json!({
        "name": settings.name,
        "clockVideo": true,
        "clockAudio": false,
    }));
    let sender = create_sender(&scheduler, sdk, &config)
        .await
        .context("failed to create sender")?;
    info!(source = %sender.source_name()?, "Sender ready");

    let patterns: Vec<Bytes> = (0..BARS.len()).map(colour_bars).collect();
    let silence = Bytes::from(vec![0u8; SAMPLES_PER_FRAME * 4 * CHANNELS]);

    for frame in 0..settings.frames {
        let picture = patterns[(frame as usize / 30) % patterns.len()].clone();
        let video = sender.video(&video_frame(picture));
        let audio = sender.audio(&audio_frame(silence.clone()));
        tokio::try_join!(video, audio)?;

        if frame % REPORT_INTERVAL == 0 {
            report(&sender);
        }
    }

    let metrics = sender.metrics();
    info!(
        metrics = %serde_json::to_string(&metrics)?,
        outstanding_buffers = sender.outstanding_buffers(),
        "Sending finished"
    );

    sender.destroy().await?;
    info!("Pattern sender stopped");
    Ok(())
}
