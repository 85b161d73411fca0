//! Hardware composition engine
//!
//! Each frame either goes through the overlay path (the hardware composites
//! what it can, the GPU renders the rest into the framebuffer target) or,
//! when the renderables cannot be given to the hardware, through the full
//! GPU path where only the framebuffer target is submitted.
//!
//! Overlay path, per frame:
//! 1. compatibility pre-filter over the whole list
//! 2. update the layer list, `prepare`, skip the frame if nothing changed
//! 3. GPU-render the layers the hardware rejected into a fresh framebuffer
//!    target, in list order
//! 4. hand acquire fences to the hardware and `set`
//! 5. give release fences back to the buffers the hardware read, and the
//!    retirement fence to buffers that just left the screen

use crate::buffer::{Buffer, BufferAccess, BufferId};
use crate::error::{CompositionError, HwcError};
use crate::fence::Fence;
use crate::geometry::{Point, Rectangle};
use crate::hwc::device::HwcDevice;
use crate::hwc::layer::LayerType;
use crate::hwc::layer_list::LayerList;
use crate::hwc::logger::{HwcLogger, NullHwcLogger, OverlayOptimization};
use crate::renderable::{Renderable, RenderableId, RenderableList};
use cgmath::{Matrix4, SquareMatrix};
use log::{debug, error, info};
use std::collections::HashSet;
use std::sync::Arc;

/// Layers every overlay frame reserves: the framebuffer target
const OVERLAY_RESERVED_LAYERS: usize = 1;

/// Why a list can or cannot be offered to the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    /// Overlay optimization is switched off
    Disabled,
    Empty,
    /// More renderables than hardware layers
    TooManyLayers,
    /// A renderable is translucent
    Alpha(RenderableId),
    /// A renderable has a non-identity transform
    Transform(RenderableId),
}

impl Compatibility {
    pub fn is_compatible(self) -> bool {
        self == Compatibility::Compatible
    }
}

/// List-wide pre-filter: hardware planes here support neither blending
/// weights nor arbitrary transforms. Shaped content is left to `prepare`,
/// which sees the layer's coverage blending.
pub fn check_compatibility(
    renderables: &RenderableList,
    max_layers: usize,
    alpha_tolerance: f32,
) -> Compatibility {
    if renderables.is_empty() {
        return Compatibility::Empty;
    }
    if renderables.len() + OVERLAY_RESERVED_LAYERS > max_layers {
        return Compatibility::TooManyLayers;
    }
    let identity = Matrix4::<f32>::identity();
    for renderable in renderables {
        if renderable.alpha() < 1.0 - alpha_tolerance {
            return Compatibility::Alpha(renderable.id());
        }
        if renderable.transformation() != identity {
            return Compatibility::Transform(renderable.id());
        }
    }
    Compatibility::Compatible
}

/// GPU side of the overlay path
pub trait GpuFallback {
    /// The framebuffer target to submit when nothing is GPU-rendered
    fn last_target(&self) -> Arc<dyn Buffer>;

    /// Renders `renderables`, in order, into a fresh framebuffer target and
    /// returns it with the rendering fence recorded on it
    fn render_target(
        &mut self,
        renderables: &RenderableList,
    ) -> Result<Arc<dyn Buffer>, CompositionError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposerConfig {
    pub overlay_optimization: bool,
    /// Put a skip layer in front of the framebuffer target on the GPU path
    pub force_skip_layer: bool,
    pub alpha_tolerance: f32,
    /// Lowers the hardware's own limit
    pub max_layers: Option<usize>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            overlay_optimization: true,
            force_skip_layer: false,
            alpha_tolerance: 1e-3,
            max_layers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub overlays: usize,
    pub gpu_rendered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Committed(CommitSummary),
    /// Nothing changed since the last commit
    NoCommitNeeded,
    /// The list has to go through the full GPU path
    Rejected(Compatibility),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposerStats {
    pub overlay_commits: u64,
    pub gpu_commits: u64,
    pub skipped_frames: u64,
    pub rejected_frames: u64,
    pub overlays: u64,
    pub gpu_fallback_layers: u64,
}

pub struct HwcComposer {
    device: Arc<dyn HwcDevice>,
    list: LayerList,
    logger: Box<dyn HwcLogger>,
    config: ComposerConfig,
    /// Buffers the hardware read during the last commit
    onscreen: Vec<Arc<dyn Buffer>>,
    retire_fence: Fence,
    stats: ComposerStats,
}

impl HwcComposer {
    pub fn new(device: Arc<dyn HwcDevice>, config: ComposerConfig) -> Self {
        Self::with_logger(device, config, Box::new(NullHwcLogger))
    }

    pub fn with_logger(
        device: Arc<dyn HwcDevice>,
        config: ComposerConfig,
        logger: Box<dyn HwcLogger>,
    ) -> Self {
        let hardware_max = device.max_layers();
        let max_layers = config
            .max_layers
            .map_or(hardware_max, |m| m.min(hardware_max));
        logger.log_overlay_optimization(OverlayOptimization::from(config.overlay_optimization));
        info!(
            "🧩 HWC composer: up to {} layers, overlays {}",
            max_layers,
            if config.overlay_optimization { "on" } else { "off" }
        );

        Self {
            device,
            list: LayerList::new(max_layers),
            logger,
            config,
            onscreen: Vec::new(),
            retire_fence: Fence::signaled(),
            stats: ComposerStats::default(),
        }
    }

    pub fn compatibility(&self, renderables: &RenderableList) -> Compatibility {
        if !self.config.overlay_optimization {
            return Compatibility::Disabled;
        }
        check_compatibility(renderables, self.list.max_layers(), self.config.alpha_tolerance)
    }

    /// Tries to present `renderables` with hardware overlays.
    ///
    /// `Rejected` is not an error: the caller renders the frame on the GPU
    /// and calls [`HwcComposer::post_gl`]. Whole-call `prepare`/`set`
    /// failures are returned as errors and mean the device has failed.
    pub fn post_overlays(
        &mut self,
        renderables: &RenderableList,
        gpu: &mut dyn GpuFallback,
    ) -> Result<PostOutcome, CompositionError> {
        let compatibility = self.compatibility(renderables);
        if !compatibility.is_compatible() {
            debug!("Overlay path rejected: {:?}", compatibility);
            self.stats.rejected_frames += 1;
            return Ok(PostOutcome::Rejected(compatibility));
        }

        self.list.update_list(renderables, OVERLAY_RESERVED_LAYERS)?;
        let target = gpu.last_target();
        self.list.framebuffer_target_mut()?.setup_layer(
            LayerType::FramebufferTarget,
            full_screen(target.as_ref()),
            false,
            &target,
        )?;

        self.prepare()?;

        if !self.list.needs_commit() {
            self.stats.skipped_frames += 1;
            return Ok(PostOutcome::NoCommitNeeded);
        }

        let rejected: RenderableList = renderables
            .iter()
            .zip(self.list.renderable_layers_mut())
            .filter(|(_, layer)| layer.needs_gl_render())
            .map(|(renderable, _)| Arc::clone(renderable))
            .collect();

        if !rejected.is_empty() {
            debug!("🎨 GPU renders {} rejected layers", rejected.len());
            let rendered = gpu.render_target(&rejected)?;
            let mut fb = self.list.framebuffer_target_mut()?;
            fb.set_buffer(&rendered);
            fb.mark_needs_commit();
        }

        self.commit()?;

        let summary = CommitSummary {
            overlays: renderables.len() - rejected.len(),
            gpu_rendered: rejected.len(),
        };
        self.stats.overlay_commits += 1;
        self.stats.overlays += summary.overlays as u64;
        self.stats.gpu_fallback_layers += summary.gpu_rendered as u64;
        Ok(PostOutcome::Committed(summary))
    }

    /// Presents a framebuffer the GPU composited in full
    pub fn post_gl(&mut self, framebuffer: &Arc<dyn Buffer>) -> Result<(), CompositionError> {
        let screen = full_screen(framebuffer.as_ref());
        let reserved = if self.config.force_skip_layer { 2 } else { 1 };
        self.list.update_list(&Vec::new(), reserved)?;

        if self.config.force_skip_layer {
            self.list
                .layer_mut(0)?
                .setup_layer(LayerType::Skip, screen, false, framebuffer)?;
        }
        self.list.framebuffer_target_mut()?.setup_layer(
            LayerType::FramebufferTarget,
            screen,
            false,
            framebuffer,
        )?;

        self.prepare()?;
        self.commit()?;
        self.stats.gpu_commits += 1;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), HwcError> {
        self.logger.log_list_submitted_to_prepare(self.list.contents());
        self.device
            .prepare(self.list.contents_mut())
            .map_err(|e| {
                error!("❌ HWC prepare failed: {}", e);
                e
            })?;
        self.logger.log_prepare_done(self.list.contents());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), HwcError> {
        for mut layer in self.list.layers_mut() {
            if let Some(buffer) = layer.buffer().cloned() {
                layer.set_acquirefence_from(buffer.as_ref());
            }
        }

        self.logger.log_set_list(self.list.contents());
        self.device.set(self.list.contents_mut()).map_err(|e| {
            error!("❌ HWC set failed: {}", e);
            e
        })?;

        self.harvest();
        Ok(())
    }

    fn harvest(&mut self) {
        let mut onscreen: Vec<Arc<dyn Buffer>> = Vec::new();
        for mut layer in self.list.layers_mut() {
            let Some(buffer) = layer.buffer().cloned() else {
                continue;
            };
            if layer.is_consumed_by_hardware() {
                onscreen.push(Arc::clone(&buffer));
            }
            layer.update_from_releasefence(buffer.as_ref());
        }

        let retire = self.list.contents_mut().retire_fence.take();
        let still_onscreen: HashSet<BufferId> = onscreen.iter().map(|b| b.id()).collect();
        for buffer in self.onscreen.drain(..) {
            if !still_onscreen.contains(&buffer.id()) {
                buffer
                    .native_buffer()
                    .update_usage(retire.copy(), BufferAccess::Read);
            }
        }
        self.onscreen = onscreen;
        self.retire_fence = retire;
    }

    /// Buffers the hardware read in the last commit
    pub fn onscreen_buffers(&self) -> Vec<BufferId> {
        self.onscreen.iter().map(|b| b.id()).collect()
    }

    /// Retirement fence of the last commit
    pub fn retire_fence(&self) -> Fence {
        self.retire_fence.copy()
    }

    pub fn layer_list(&self) -> &LayerList {
        &self.list
    }

    pub fn stats(&self) -> &ComposerStats {
        &self.stats
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn HwcDevice> {
        &self.device
    }

    pub fn logger(&self) -> &dyn HwcLogger {
        self.logger.as_ref()
    }
}

fn full_screen(framebuffer: &dyn Buffer) -> Rectangle {
    Rectangle::new(Point::new(0, 0), framebuffer.size())
}
