//! In-memory display hardware
//!
//! Wires the composition stack to [`SimulatedHwc`], the software allocator
//! and the recording GL backend, so the whole pipeline runs without a GPU
//! or display controller.

pub mod hwc;

pub use hwc::{CommittedFrame, CommittedLayer, SimHwcConfig, SimulatedHwc};

use crate::buffer::{PixelFormat, ShmAllocator};
use crate::config::StrataConfig;
use crate::display::DisplayBuffer;
use crate::error::CompositionError;
use crate::framebuffer::SwappingFramebuffers;
use crate::geometry::{Point, Rectangle, Size};
use crate::hwc::composer::HwcComposer;
use crate::renderer::recording::{GlCallLog, RecordingBackend};
use crate::renderer::GlRenderer;
use log::info;
use parking_lot::Mutex;
use std::sync::Arc;

pub const DEFAULT_SIZE: Size = Size::new(1280, 720);

pub struct SimPlatform {
    hwc: Arc<SimulatedHwc>,
    allocator: Arc<ShmAllocator>,
    size: Size,
}

impl SimPlatform {
    pub fn new(hwc: SimHwcConfig, config: &StrataConfig) -> Self {
        Self::with_size(hwc, config, DEFAULT_SIZE)
    }

    pub fn with_size(hwc: SimHwcConfig, config: &StrataConfig, size: Size) -> Self {
        Self {
            hwc: Arc::new(SimulatedHwc::new(hwc)),
            allocator: Arc::new(ShmAllocator::new(config.fences.wait_timeout())),
            size,
        }
    }

    pub fn hwc(&self) -> &Arc<SimulatedHwc> {
        &self.hwc
    }

    pub fn allocator(&self) -> &Arc<ShmAllocator> {
        &self.allocator
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Builds the display for the simulated output. The returned call log
    /// records everything the renderer asked of GL.
    pub fn create_display(
        &self,
        config: &StrataConfig,
    ) -> Result<(DisplayBuffer<RecordingBackend>, Arc<Mutex<GlCallLog>>), CompositionError> {
        let backend = RecordingBackend::new();
        let log = backend.log();
        let renderer = GlRenderer::new(backend, Rectangle::new(Point::new(0, 0), self.size))?;
        let framebuffers = SwappingFramebuffers::new(
            self.allocator.as_ref(),
            self.size,
            PixelFormat::Abgr8888,
            config.display.framebuffers,
        )?;
        let composer = HwcComposer::with_logger(
            self.hwc.clone(),
            config.composer_config(),
            config.hwc.logger(),
        );
        info!(
            "🧪 Simulated display {}x{}",
            self.size.width, self.size.height
        );
        Ok((
            DisplayBuffer::new(
                renderer,
                Box::new(framebuffers),
                composer,
                config.display.orientation,
            ),
            log,
        ))
    }
}
