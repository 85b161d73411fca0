//! A hardware composer that runs in memory
//!
//! Claims layers as overlays under configurable rules and models scanout: a
//! committed frame reaches the screen on the next vsync (or when the next
//! frame is committed, whichever comes first). Its retire fence signals at
//! that point, and the release fences of the frame it replaced do too.

use crate::buffer::NativeHandle;
use crate::error::HwcError;
use crate::fence::{SyncPoint, Timeline};
use crate::geometry::Orientation;
use crate::hwc::device::{
    Blending, CompositionType, DisplayContents, HwcCallbacks, HwcDevice, PRIMARY_DISPLAY,
};
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Commits kept for inspection
pub const FRAME_HISTORY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SimHwcConfig {
    /// Size of the layer array, reserved layers included
    pub max_layers: usize,
    /// How many layers prepare may claim per frame
    pub max_overlays: usize,
    /// When false every layer is left to the GPU
    pub accept_overlays: bool,
    /// Leave layers with blending enabled to the GPU
    pub reject_blended: bool,
    /// Whether the output can be rotated in hardware
    pub rotates: bool,
}

impl Default for SimHwcConfig {
    fn default() -> Self {
        Self {
            max_layers: 8,
            max_overlays: 4,
            accept_overlays: true,
            reject_blended: true,
            rotates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedLayer {
    pub composition_type: CompositionType,
    pub skip: bool,
    pub handle: Option<NativeHandle>,
    /// An acquire fence was attached and still pending at commit
    pub acquire_pending: bool,
    /// Any acquire fence was attached at all
    pub had_acquire_fence: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFrame {
    pub sequence: u64,
    pub layers: Vec<CommittedLayer>,
}

impl CommittedFrame {
    pub fn overlays(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| l.composition_type == CompositionType::Overlay)
            .count()
    }

    pub fn framebuffer_target(&self) -> Option<&CommittedLayer> {
        self.layers
            .iter()
            .find(|l| l.composition_type == CompositionType::FramebufferTarget)
    }
}

#[derive(Default)]
struct SimState {
    callbacks: Option<Arc<dyn HwcCallbacks>>,
    vsync_enabled: bool,
    blanked: bool,
    prepares: u64,
    /// Release points of the frame being scanned out
    on_screen: Vec<Arc<SyncPoint>>,
    /// Release points of the committed frame waiting for vsync
    queued: Vec<Arc<SyncPoint>>,
    queued_retire: Option<Arc<SyncPoint>>,
    presented: u64,
    committed: u64,
    /// The most recent commits, oldest first
    frames: VecDeque<CommittedFrame>,
}

pub struct SimulatedHwc {
    config: SimHwcConfig,
    state: Mutex<SimState>,
    timeline: Timeline,
    epoch: Instant,
    fail_next_prepare: AtomicBool,
    fail_next_set: AtomicBool,
}

impl SimulatedHwc {
    pub fn new(config: SimHwcConfig) -> Self {
        Self {
            config,
            // starts blanked like a freshly opened device
            state: Mutex::new(SimState {
                blanked: true,
                ..SimState::default()
            }),
            timeline: Timeline::new("sim-hwc"),
            epoch: Instant::now(),
            fail_next_prepare: AtomicBool::new(false),
            fail_next_set: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SimHwcConfig {
        &self.config
    }

    /// A vsync: presents any queued frame, then notifies the registered
    /// callbacks if vsync events are enabled. Returns whether they were
    /// notified.
    pub fn fire_vsync(&self) -> bool {
        self.present();
        let callbacks = {
            let state = self.state.lock();
            if !state.vsync_enabled {
                return false;
            }
            state.callbacks.clone()
        };
        match callbacks {
            Some(cb) => {
                let ts = self.epoch.elapsed().as_nanos() as i64;
                cb.vsync(PRIMARY_DISPLAY, ts);
                true
            }
            None => false,
        }
    }

    pub fn fire_invalidate(&self) {
        let callbacks = self.state.lock().callbacks.clone();
        if let Some(cb) = callbacks {
            cb.invalidate();
        }
    }

    pub fn fire_hotplug(&self, connected: bool) {
        let callbacks = self.state.lock().callbacks.clone();
        if let Some(cb) = callbacks {
            cb.hotplug(PRIMARY_DISPLAY, connected);
        }
    }

    /// Makes the next `prepare` fail as a whole
    pub fn fail_next_prepare(&self) {
        self.fail_next_prepare.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_set(&self) {
        self.fail_next_set.store(true, Ordering::SeqCst);
    }

    /// Puts the queued frame on screen. Returns `false` if nothing was queued.
    pub fn present(&self) -> bool {
        let done = {
            let mut state = self.state.lock();
            let Some(retire) = state.queued_retire.take() else {
                return false;
            };
            let mut done = std::mem::take(&mut state.on_screen);
            done.push(retire);
            state.on_screen = std::mem::take(&mut state.queued);
            state.presented += 1;
            done
        };
        for point in done {
            point.signal();
        }
        true
    }

    /// Takes everything off screen, signaling every outstanding fence
    pub fn release_all(&self) {
        let points: Vec<_> = {
            let mut state = self.state.lock();
            let mut points = std::mem::take(&mut state.on_screen);
            points.append(&mut state.queued);
            points.extend(state.queued_retire.take());
            points
        };
        for point in points {
            point.signal();
        }
    }

    /// Up to the last [`FRAME_HISTORY`] commits, oldest first
    pub fn frames(&self) -> Vec<CommittedFrame> {
        self.state.lock().frames.iter().cloned().collect()
    }

    pub fn last_frame(&self) -> Option<CommittedFrame> {
        self.state.lock().frames.back().cloned()
    }

    /// Commits since creation, including those no longer in the history
    pub fn commit_count(&self) -> usize {
        self.state.lock().committed as usize
    }

    pub fn presented_count(&self) -> u64 {
        self.state.lock().presented
    }

    pub fn prepare_count(&self) -> u64 {
        self.state.lock().prepares
    }

    pub fn is_blanked(&self) -> bool {
        self.state.lock().blanked
    }

    pub fn vsync_enabled(&self) -> bool {
        self.state.lock().vsync_enabled
    }
}

impl Default for SimulatedHwc {
    fn default() -> Self {
        Self::new(SimHwcConfig::default())
    }
}

impl HwcDevice for SimulatedHwc {
    fn prepare(&self, contents: &mut DisplayContents) -> Result<(), HwcError> {
        if self.fail_next_prepare.swap(false, Ordering::SeqCst) {
            return Err(HwcError::Prepare(-5));
        }
        self.state.lock().prepares += 1;

        let mut claimed = 0;
        for layer in contents.layers.iter_mut() {
            if layer.composition_type != CompositionType::Framebuffer || layer.skip {
                continue;
            }
            let acceptable = self.config.accept_overlays
                && claimed < self.config.max_overlays
                && layer.transform == Orientation::Normal
                && !(self.config.reject_blended && layer.blending != Blending::None);
            if acceptable {
                layer.composition_type = CompositionType::Overlay;
                claimed += 1;
            }
        }
        trace!("sim prepare claimed {} of {} layers", claimed, contents.len());
        Ok(())
    }

    fn set(&self, contents: &mut DisplayContents) -> Result<(), HwcError> {
        if self.fail_next_set.swap(false, Ordering::SeqCst) {
            return Err(HwcError::Set(-5));
        }
        // a frame still waiting for vsync is shown before it is replaced
        self.present();

        let mut state = self.state.lock();
        let mut layers = Vec::with_capacity(contents.len());
        for layer in contents.layers.iter_mut() {
            let acquire = layer.acquire_fence.take();
            let scanned_out = matches!(
                layer.composition_type,
                CompositionType::Overlay | CompositionType::FramebufferTarget
            ) && layer.handle.is_some();
            if scanned_out {
                let (release, point) = self.timeline.create_fence();
                layer.release_fence = release;
                state.queued.push(point);
            }
            layers.push(CommittedLayer {
                composition_type: layer.composition_type,
                skip: layer.skip,
                handle: layer.handle,
                acquire_pending: !acquire.is_signaled(),
                had_acquire_fence: acquire.is_valid(),
            });
        }

        let (retire, point) = self.timeline.create_fence();
        contents.retire_fence = retire;
        state.queued_retire = Some(point);

        state.committed += 1;
        let sequence = state.committed;
        debug!("🖥️ sim committed frame {} with {} layers", sequence, layers.len());
        if state.frames.len() == FRAME_HISTORY {
            state.frames.pop_front();
        }
        state.frames.push_back(CommittedFrame { sequence, layers });
        Ok(())
    }

    fn blank(&self, blank: bool) -> Result<(), HwcError> {
        self.state.lock().blanked = blank;
        Ok(())
    }

    fn event_control(&self, vsync_enabled: bool) -> Result<(), HwcError> {
        self.state.lock().vsync_enabled = vsync_enabled;
        Ok(())
    }

    fn register_callbacks(&self, callbacks: Arc<dyn HwcCallbacks>) {
        self.state.lock().callbacks = Some(callbacks);
    }

    fn max_layers(&self) -> usize {
        self.config.max_layers
    }

    fn apply_orientation(&self, orientation: Orientation) -> bool {
        orientation == Orientation::Normal || self.config.rotates
    }
}
