//! # strata
//!
//! Composition and buffer handoff for a display server: puts a list of
//! surfaces on screen through hardware overlay planes where the display
//! controller accepts them and through OpenGL composition where it does not,
//! with explicit fences guarding every buffer handoff.
//!
//! ## Architecture
//!
//! - `renderer`: GPU compositor with tessellation and a texture cache
//! - `hwc`: hardware composer layer list, overlay decisions, two-phase commit
//! - `fence`, `buffer`: sync fences and buffer usage tracking
//! - `framebuffer`: framebuffer target buffers the GPU renders into
//! - `display`: one display, overlay path or full GPU path
//! - `compositor`: per-frame driver and the vsync-paced compositing thread
//! - `vsync`: vsync and hardware notification handling
//! - `snapshot`: asynchronous buffer capture
//! - `sim`: in-memory hardware for tests and the demo binary
//! - `config`: TOML configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::compositor::{DisplayBufferCompositor, SharedScene};
//! use strata::sim::{SimHwcConfig, SimPlatform};
//! use strata::StrataConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = StrataConfig::default();
//!     let platform = SimPlatform::new(SimHwcConfig::default(), &config);
//!     let (display, _gl) = platform.create_display(&config)?;
//!     let scene = Arc::new(SharedScene::default());
//!     let mut compositor = DisplayBufferCompositor::new(display, scene);
//!     compositor.composite()?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod compositor;
pub mod config;
pub mod display;
pub mod error;
pub mod fence;
pub mod framebuffer;
pub mod geometry;
pub mod hwc;
pub mod renderable;
pub mod renderer;
pub mod sim;
pub mod snapshot;
pub mod vsync;

// Re-export main types for easy access
pub use buffer::{Buffer, BufferAllocator, NativeBuffer, PixelFormat, ShmAllocator, ShmBuffer};
pub use compositor::{CompositingThread, DisplayBufferCompositor, Scene, SharedScene};
pub use config::StrataConfig;
pub use display::{DisplayBuffer, DisplayConfiguration, PowerMode};
pub use error::{CompositionError, Result};
pub use fence::{Fence, Timeline};
pub use geometry::{Orientation, Point, Rectangle, Size};
pub use hwc::{HwcComposer, HwcDevice};
pub use renderable::{Renderable, RenderableId, RenderableList, SurfaceRenderable};
pub use renderer::GlRenderer;
pub use vsync::VsyncCoordinator;

/// Version information for strata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
