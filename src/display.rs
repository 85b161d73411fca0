//! One physical display: overlay-optimised presentation with GPU fallback
//!
//! [`DisplayBuffer::post_renderables_if_optimizable`] offers a frame to the
//! hardware composer. When that returns `false` the caller composites the
//! whole frame with [`DisplayBuffer::render_and_post`].

use crate::buffer::{Buffer, BufferAccess, PixelFormat};
use crate::error::CompositionError;
use crate::framebuffer::FramebufferBundle;
use crate::geometry::{Orientation, Point, Rectangle, Size};
use crate::hwc::composer::{GpuFallback, HwcComposer, PostOutcome};
use crate::hwc::device::HwcDevice;
use crate::renderable::{renderables_in_view, RenderableList};
use crate::renderer::backend::GlBackend;
use crate::renderer::GlRenderer;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    #[default]
    On,
    Standby,
    Suspend,
    Off,
}

impl PowerMode {
    pub fn is_on(self) -> bool {
        self == PowerMode::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayConfiguration {
    pub power_mode: PowerMode,
    pub orientation: Orientation,
    pub format: PixelFormat,
    /// Framebuffer size; not configurable
    pub size: Size,
    pub refresh_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayStats {
    pub overlay_frames: u64,
    pub gpu_frames: u64,
    pub skipped_frames: u64,
}

/// Renders rejected layers into the next framebuffer
struct GpuPath<'a, B: GlBackend> {
    renderer: &'a mut GlRenderer<B>,
    framebuffers: &'a mut dyn FramebufferBundle,
}

impl<B: GlBackend> GpuFallback for GpuPath<'_, B> {
    fn last_target(&self) -> Arc<dyn Buffer> {
        self.framebuffers.last_rendered()
    }

    fn render_target(
        &mut self,
        renderables: &RenderableList,
    ) -> Result<Arc<dyn Buffer>, CompositionError> {
        render_into_next(self.renderer, self.framebuffers, renderables)
    }
}

fn render_into_next<B: GlBackend>(
    renderer: &mut GlRenderer<B>,
    framebuffers: &mut dyn FramebufferBundle,
    renderables: &RenderableList,
) -> Result<Arc<dyn Buffer>, CompositionError> {
    let target = framebuffers.buffer_for_render()?;
    renderer.begin();
    renderer.render(renderables)?;
    let fence = renderer.end();
    target
        .native_buffer()
        .update_usage(fence, BufferAccess::Write);
    Ok(target)
}

pub struct DisplayBuffer<B: GlBackend> {
    renderer: GlRenderer<B>,
    framebuffers: Box<dyn FramebufferBundle>,
    composer: HwcComposer,
    device: Arc<dyn HwcDevice>,
    power_mode: PowerMode,
    orientation: Orientation,
    /// The hardware could not rotate, so the GPU does
    renderer_rotates: bool,
    stats: DisplayStats,
}

impl<B: GlBackend> DisplayBuffer<B> {
    pub fn new(
        renderer: GlRenderer<B>,
        framebuffers: Box<dyn FramebufferBundle>,
        composer: HwcComposer,
        orientation: Orientation,
    ) -> Self {
        let device = Arc::clone(composer.device());
        let mut display = Self {
            renderer,
            framebuffers,
            composer,
            device,
            power_mode: PowerMode::On,
            orientation: Orientation::Normal,
            renderer_rotates: false,
            stats: DisplayStats::default(),
        };
        display.apply_orientation(orientation);
        display
    }

    /// Presents `renderables` through the hardware composer if it can take
    /// them. Returns `false` when the frame must go through
    /// [`render_and_post`](Self::render_and_post) instead.
    ///
    /// Hidden renderables and those entirely outside the view area are
    /// dropped first; the rest are read once, as frozen copies.
    pub fn post_renderables_if_optimizable(
        &mut self,
        renderables: &RenderableList,
    ) -> Result<bool, CompositionError> {
        if !self.power_mode.is_on() {
            debug!("Display is off, dropping frame");
            return Ok(true);
        }
        // hardware planes cannot follow a GPU-side rotation
        if self.renderer_rotates && self.orientation != Orientation::Normal {
            return Ok(false);
        }

        let visible = renderables_in_view(renderables, &self.view_area());
        let mut gpu = GpuPath {
            renderer: &mut self.renderer,
            framebuffers: self.framebuffers.as_mut(),
        };
        match self.composer.post_overlays(&visible, &mut gpu)? {
            PostOutcome::Committed(summary) => {
                debug!(
                    "🧩 Committed {} overlays, {} GPU layers",
                    summary.overlays, summary.gpu_rendered
                );
                self.stats.overlay_frames += 1;
                Ok(true)
            }
            PostOutcome::NoCommitNeeded => {
                self.stats.skipped_frames += 1;
                Ok(true)
            }
            PostOutcome::Rejected(_) => Ok(false),
        }
    }

    /// Composites every visible renderable on the GPU and presents the result
    pub fn render_and_post(&mut self, renderables: &RenderableList) -> Result<(), CompositionError> {
        if !self.power_mode.is_on() {
            return Ok(());
        }
        let visible = renderables_in_view(renderables, &self.view_area());
        let target = render_into_next(&mut self.renderer, self.framebuffers.as_mut(), &visible)?;
        self.composer.post_gl(&target)?;
        self.stats.gpu_frames += 1;
        Ok(())
    }

    pub fn configuration(&self) -> DisplayConfiguration {
        DisplayConfiguration {
            power_mode: self.power_mode,
            orientation: self.orientation,
            format: self.framebuffers.fb_format(),
            size: self.framebuffers.fb_size(),
            refresh_rate: self.framebuffers.fb_refresh_rate(),
        }
    }

    /// Applies power mode and orientation.
    ///
    /// The pixel format is fixed by the framebuffers; asking for another one
    /// is a configuration error. Power modes other than `On` all blank the
    /// display, and a request that leaves the on/off state unchanged does
    /// not touch the hardware.
    pub fn configure(&mut self, config: &DisplayConfiguration) -> Result<(), CompositionError> {
        let format = self.framebuffers.fb_format();
        if config.format != format {
            return Err(CompositionError::Configuration(format!(
                "pixel format {:?} not supported, display uses {:?}",
                config.format, format
            )));
        }

        if config.power_mode.is_on() != self.power_mode.is_on() {
            let on = config.power_mode.is_on();
            self.device.blank(!on)?;
            self.composer.logger().log_display_on_off(on);
            if !on {
                self.renderer.suspend();
            }
            info!("📺 Display turned {}", if on { "on" } else { "off" });
        }
        self.power_mode = config.power_mode;

        if config.orientation != self.orientation {
            self.apply_orientation(config.orientation);
        }
        Ok(())
    }

    fn apply_orientation(&mut self, orientation: Orientation) {
        self.renderer_rotates = !self.device.apply_orientation(orientation);
        let degrees = if self.renderer_rotates {
            orientation.degrees()
        } else {
            0.0
        };
        self.orientation = orientation;
        self.renderer.set_rotation(degrees);
        self.renderer.set_viewport(self.view_area());
        debug!(
            "🔄 Orientation {:?} ({})",
            orientation,
            if self.renderer_rotates { "GPU" } else { "hardware" }
        );
    }

    /// The area renderables are laid out in: the framebuffer, transposed
    /// when the GPU rotates it by a quarter turn
    pub fn view_area(&self) -> Rectangle {
        let size = self.framebuffers.fb_size();
        let size = if self.renderer_rotates && self.orientation.is_transposed() {
            size.transposed()
        } else {
            size
        };
        Rectangle::new(Point::new(0, 0), size)
    }

    pub fn stats(&self) -> &DisplayStats {
        &self.stats
    }

    pub fn composer(&self) -> &HwcComposer {
        &self.composer
    }

    pub fn renderer(&self) -> &GlRenderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut GlRenderer<B> {
        &mut self.renderer
    }
}
