//! # strata - display composition engine
//!
//! Runs the full composition pipeline against the simulated hardware
//! composer: a scene of surfaces is composited through overlays and the GPU
//! path once per simulated vsync, then a summary is printed.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use strata::buffer::{Buffer, PixelFormat};
use strata::compositor::{
    forward_display_events, CompositingThread, DisplayBufferCompositor, SharedScene,
};
use strata::geometry::{Rectangle, Size};
use strata::renderable::{RenderableId, RenderableList, SurfaceRenderable};
use strata::sim::{SimHwcConfig, SimPlatform};
use strata::{StrataConfig, VsyncCoordinator};

/// Simulated vsync period (60 Hz)
const VSYNC_PERIOD: Duration = Duration::from_micros(16_667);

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Display composition engine with hardware overlays and GPU fallback")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/strata/strata.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Number of vsync periods to run for
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Number of surfaces in the scene
    #[arg(long, default_value_t = 3)]
    surfaces: u32,

    /// Composite everything on the GPU
    #[arg(long)]
    no_overlays: bool,

    /// Make the simulated hardware refuse every overlay
    #[arg(long)]
    no_hardware_accept: bool,
}

/// A surface with two buffers it flips between
struct DemoSurface {
    renderable: Arc<SurfaceRenderable>,
    buffers: [Arc<dyn Buffer>; 2],
}

fn build_scene(platform: &SimPlatform, count: u32) -> Result<Vec<DemoSurface>> {
    let screen = platform.size();
    let tile = Size::new(screen.width / 4, screen.height / 4);
    let mut surfaces = Vec::with_capacity(count as usize);

    for i in 0..count {
        let make_buffer = |shade: u8| -> Result<Arc<dyn Buffer>> {
            let buffer = platform
                .allocator()
                .allocate(tile, PixelFormat::Abgr8888)
                .context("Failed to allocate surface buffer")?;
            buffer.fill([shade, (i * 50 % 256) as u8, 0x80, 0xff])?;
            let buffer: Arc<dyn Buffer> = buffer;
            Ok(buffer)
        };
        let buffers = [make_buffer(0x40)?, make_buffer(0xc0)?];

        let offset = i as i32 * tile.width / 2;
        let renderable = SurfaceRenderable::new(
            RenderableId(u64::from(i) + 1),
            Arc::clone(&buffers[0]),
            Rectangle::from_xywh(offset, offset, tile.width, tile.height),
        )
        // every third surface has transparent regions
        .with_shaped(i % 3 == 2);

        surfaces.push(DemoSurface {
            renderable: Arc::new(renderable),
            buffers,
        });
    }
    Ok(surfaces)
}

fn renderable_list(surfaces: &[DemoSurface]) -> RenderableList {
    surfaces
        .iter()
        .map(|s| Arc::clone(&s.renderable) as Arc<dyn strata::Renderable>)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting strata");
    info!(
        "📄 Version: {} ({} {})",
        strata::VERSION,
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("BUILD_DATE").unwrap_or("")
    );

    // Load configuration
    let mut config = match StrataConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            warn!("⚠️ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            StrataConfig::default()
        }
    };

    // Override config with CLI flags
    if cli.no_overlays {
        config.hwc.overlay_optimization = false;
        info!("🚫 Overlay optimization disabled via CLI flag");
    }
    config.validate()?;

    let sim = SimHwcConfig {
        accept_overlays: !cli.no_hardware_accept,
        ..SimHwcConfig::default()
    };
    let platform = SimPlatform::new(sim, &config);
    let hwc = Arc::clone(platform.hwc());

    let vsync = Arc::new(
        VsyncCoordinator::new(hwc.clone()).context("Failed to initialize display hardware")?,
    );
    let events = vsync.take_events();

    let (display, gl_log) = platform
        .create_display(&config)
        .context("Failed to create display")?;
    let surfaces = build_scene(&platform, cli.surfaces)?;
    let scene = Arc::new(SharedScene::new(renderable_list(&surfaces)));

    let compositor = DisplayBufferCompositor::new(display, scene.clone());
    let thread = CompositingThread::start(compositor, Arc::clone(&vsync), config.vsync.timeout())
        .context("Failed to start compositing thread")?;
    let forwarder =
        events.map(|events| tokio::spawn(forward_display_events(events, thread.scheduler())));

    let mut ticker = tokio::time::interval(VSYNC_PERIOD);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("🎬 Running {} frames with {} surfaces", cli.frames, cli.surfaces);
    for frame in 0..cli.frames {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("📨 Received Ctrl+C, shutting down gracefully");
                break;
            }
            _ = ticker.tick() => {
                // the first surface flips buffers every other frame
                if let Some(first) = surfaces.first() {
                    let next = &first.buffers[(frame / 2 % 2) as usize];
                    first.renderable.submit_buffer(Arc::clone(next));
                }
                hwc.fire_vsync();
                thread.schedule();
            }
        }
        if !thread.is_running() {
            break;
        }
    }

    let report = thread.stop();
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    hwc.release_all();

    let gl = gl_log.lock();
    println!("strata {} summary", strata::VERSION);
    println!("  frames composited : {}", report.frames);
    println!("  overlay frames    : {}", report.optimized_frames);
    println!("  GPU frames        : {}", report.gpu_frames);
    println!("  vsync timeouts    : {}", report.vsync_timeouts);
    println!("  hardware commits  : {}", hwc.commit_count());
    println!("  frames presented  : {}", hwc.presented_count());
    println!("  GL draws          : {}", gl.draws.len());
    println!("  texture uploads   : {}", gl.uploads.len());

    if let Some(failure) = report.failure {
        error!("❌ Display failed: {}", failure);
        return Err(failure.into());
    }

    info!("✅ strata shutdown complete");
    Ok(())
}
