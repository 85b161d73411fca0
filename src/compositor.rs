//! Frame driver and the compositing thread
//!
//! [`DisplayBufferCompositor`] turns the scene's current renderables into one
//! presented frame. [`CompositingThread`] owns a compositor on a dedicated
//! thread and composites at most once per vsync, coalescing any number of
//! "something changed" requests made in between.

use crate::display::DisplayBuffer;
use crate::error::CompositionError;
use crate::renderable::{freeze_all, RenderableList};
use crate::renderer::backend::GlBackend;
use crate::vsync::{DisplayEvent, VsyncCoordinator};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Source of the per-frame renderable list
pub trait Scene: Send + Sync {
    /// Renderables in stacking order, bottom first
    fn renderables(&self) -> RenderableList;
}

/// A scene whose list is replaced wholesale by its owner
#[derive(Default)]
pub struct SharedScene {
    renderables: Mutex<RenderableList>,
}

impl SharedScene {
    pub fn new(renderables: RenderableList) -> Self {
        Self {
            renderables: Mutex::new(renderables),
        }
    }

    pub fn set_renderables(&self, renderables: RenderableList) {
        *self.renderables.lock() = renderables;
    }
}

impl Scene for SharedScene {
    fn renderables(&self) -> RenderableList {
        self.renderables.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePath {
    /// Handled by the hardware composer, possibly with some layers rendered
    /// by the GPU
    Optimized,
    /// Entire frame composited by the GPU
    Gpu,
}

pub struct DisplayBufferCompositor<B: GlBackend> {
    display: DisplayBuffer<B>,
    scene: Arc<dyn Scene>,
}

impl<B: GlBackend> DisplayBufferCompositor<B> {
    pub fn new(display: DisplayBuffer<B>, scene: Arc<dyn Scene>) -> Self {
        Self { display, scene }
    }

    /// Composites one frame from a single frozen read of the scene, so both
    /// paths see the same state even if the scene changes meanwhile
    pub fn composite(&mut self) -> Result<FramePath, CompositionError> {
        let renderables = freeze_all(&self.scene.renderables());
        if self.display.post_renderables_if_optimizable(&renderables)? {
            return Ok(FramePath::Optimized);
        }
        debug!("🎨 Falling back to GPU composition");
        self.display.render_and_post(&renderables)?;
        Ok(FramePath::Gpu)
    }

    pub fn display(&self) -> &DisplayBuffer<B> {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplayBuffer<B> {
        &mut self.display
    }
}

/// What the compositing thread did before it stopped
#[derive(Debug, Default)]
pub struct CompositorReport {
    pub frames: u64,
    pub optimized_frames: u64,
    pub gpu_frames: u64,
    pub vsync_timeouts: u64,
    /// The fatal error that stopped the thread, if any
    pub failure: Option<CompositionError>,
}

#[derive(Debug, Default)]
struct ScheduleState {
    pending: bool,
    stop: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ScheduleState>,
    cond: Condvar,
}

/// Cheap handle for requesting recomposition from any thread
#[derive(Debug, Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Requests a frame. Requests made before the thread gets to composite
    /// are merged into one frame.
    pub fn schedule(&self) {
        let mut state = self.shared.state.lock();
        state.pending = true;
        self.shared.cond.notify_one();
    }
}

pub struct CompositingThread {
    scheduler: Scheduler,
    handle: Option<JoinHandle<CompositorReport>>,
}

impl CompositingThread {
    /// Moves `compositor` onto a new thread. `vsync_timeout` bounds each wait
    /// for the vsync that paces frames.
    pub fn start<B: GlBackend + 'static>(
        compositor: DisplayBufferCompositor<B>,
        vsync: Arc<VsyncCoordinator>,
        vsync_timeout: Duration,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("strata-compositor".into())
            .spawn(move || run(compositor, &thread_shared, &vsync, vsync_timeout))?;

        info!("🎬 Compositing thread started");
        Ok(Self {
            scheduler: Scheduler { shared },
            handle: Some(handle),
        })
    }

    pub fn schedule(&self) {
        self.scheduler.schedule();
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// `false` once the thread has exited, normally after a fatal error
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the thread after any frame in progress and returns its report
    pub fn stop(mut self) -> CompositorReport {
        self.shutdown().unwrap_or_default()
    }

    fn shutdown(&mut self) -> Option<CompositorReport> {
        let handle = self.handle.take()?;
        {
            let mut state = self.scheduler.shared.state.lock();
            state.stop = true;
            self.scheduler.shared.cond.notify_all();
        }
        match handle.join() {
            Ok(report) => {
                info!("🛑 Compositing thread stopped after {} frames", report.frames);
                Some(report)
            }
            Err(_) => {
                error!("💥 Compositing thread panicked");
                None
            }
        }
    }
}

impl Drop for CompositingThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<B: GlBackend>(
    mut compositor: DisplayBufferCompositor<B>,
    shared: &Shared,
    vsync: &VsyncCoordinator,
    vsync_timeout: Duration,
) -> CompositorReport {
    let mut report = CompositorReport::default();
    loop {
        {
            let mut state = shared.state.lock();
            while !state.pending && !state.stop {
                shared.cond.wait(&mut state);
            }
            if state.stop {
                break;
            }
            state.pending = false;
        }

        match compositor.composite() {
            Ok(path) => {
                report.frames += 1;
                match path {
                    FramePath::Optimized => report.optimized_frames += 1,
                    FramePath::Gpu => report.gpu_frames += 1,
                }
            }
            Err(e) if e.is_fatal() => {
                error!("❌ Composition failed, stopping display: {}", e);
                report.failure = Some(e);
                break;
            }
            Err(e) => warn!("⚠️ Frame dropped: {}", e),
        }

        // one commit per vsync
        if vsync.wait_for_vsync_timeout(vsync_timeout).is_none() {
            debug!("⏱️ No vsync within {:?}", vsync_timeout);
            report.vsync_timeouts += 1;
        }
    }
    report
}

/// Drains hardware notifications, scheduling a frame for each invalidate.
/// Returns when the coordinator is dropped.
pub async fn forward_display_events(
    mut events: UnboundedReceiver<DisplayEvent>,
    scheduler: Scheduler,
) {
    while let Some(event) = events.recv().await {
        match event {
            DisplayEvent::Invalidate => scheduler.schedule(),
            DisplayEvent::Hotplug { display, connected } => info!(
                "🔌 Display {} {}",
                display,
                if connected { "connected" } else { "disconnected" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, PixelFormat, ShmAllocator};
    use crate::error::HwcError;
    use crate::framebuffer::SwappingFramebuffers;
    use crate::geometry::{Orientation, Point, Rectangle, Size};
    use crate::hwc::composer::{ComposerConfig, HwcComposer};
    use crate::hwc::device::{CompositionType, HwcCallbacks, MockHwcDevice};
    use crate::renderable::{RenderableId, SurfaceRenderable};
    use crate::renderer::recording::RecordingBackend;
    use crate::renderer::GlRenderer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const SIZE: Size = Size::new(64, 64);

    fn compositor(
        device: Arc<MockHwcDevice>,
        scene: Arc<dyn Scene>,
    ) -> DisplayBufferCompositor<RecordingBackend> {
        let allocator = ShmAllocator::default();
        let renderer =
            GlRenderer::new(RecordingBackend::new(), Rectangle::new(Point::new(0, 0), SIZE))
                .unwrap();
        let fbs = SwappingFramebuffers::new(&allocator, SIZE, PixelFormat::Abgr8888, 2).unwrap();
        let composer = HwcComposer::new(device, ComposerConfig::default());
        let display = DisplayBuffer::new(renderer, Box::new(fbs), composer, Orientation::Normal);
        DisplayBufferCompositor::new(display, scene)
    }

    fn scene_with_alpha(alpha: f32) -> Arc<SharedScene> {
        let allocator = ShmAllocator::default();
        let buffer: Arc<dyn Buffer> = allocator.allocate(SIZE, PixelFormat::Abgr8888).unwrap();
        Arc::new(SharedScene::new(vec![Arc::new(
            SurfaceRenderable::new(RenderableId(1), buffer, Rectangle::from_xywh(0, 0, 64, 64))
                .with_alpha(alpha),
        )]))
    }

    type CallbackSlot = Arc<Mutex<Option<Arc<dyn HwcCallbacks>>>>;

    fn device_capturing(sets: Arc<AtomicUsize>, accept: bool, slot: CallbackSlot) -> MockHwcDevice {
        let mut device = MockHwcDevice::new();
        device.expect_max_layers().return_const(4usize);
        device.expect_apply_orientation().return_const(true);
        device
            .expect_register_callbacks()
            .returning(move |cb| *slot.lock() = Some(cb));
        device.expect_event_control().returning(|_| Ok(()));
        device.expect_blank().returning(|_| Ok(()));
        device.expect_prepare().returning(move |contents| {
            if accept {
                for layer in contents.layers.iter_mut() {
                    if layer.composition_type == CompositionType::Framebuffer {
                        layer.composition_type = CompositionType::Overlay;
                    }
                }
            }
            Ok(())
        });
        device.expect_set().returning(move |_| {
            sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        device
    }

    fn device(sets: Arc<AtomicUsize>, accept: bool) -> MockHwcDevice {
        device_capturing(sets, accept, Arc::new(Mutex::new(None)))
    }

    #[test]
    fn test_composite_chooses_path() {
        let sets = Arc::new(AtomicUsize::new(0));
        let device = Arc::new(device(Arc::clone(&sets), true));

        let mut opaque = compositor(Arc::clone(&device), scene_with_alpha(1.0));
        assert_eq!(opaque.composite().unwrap(), FramePath::Optimized);

        let mut translucent = compositor(device, scene_with_alpha(0.5));
        assert_eq!(translucent.composite().unwrap(), FramePath::Gpu);
        assert_eq!(translucent.display().stats().gpu_frames, 1);
        assert_eq!(sets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scheduled_requests_are_coalesced() {
        let sets = Arc::new(AtomicUsize::new(0));
        let device = Arc::new(device(Arc::clone(&sets), false));
        let vsync = Arc::new(VsyncCoordinator::new(device.clone()).unwrap());
        let thread = CompositingThread::start(
            compositor(device, scene_with_alpha(0.5)),
            Arc::clone(&vsync),
            Duration::from_secs(5),
        )
        .unwrap();

        // a burst of requests while the thread waits for vsync
        for _ in 0..10 {
            thread.schedule();
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while sets.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(sets.load(Ordering::SeqCst), 1);

        // release the first pacing wait; the burst yields at most one more frame
        vsync.notify_vsync(1);
        thread::sleep(Duration::from_millis(50));
        vsync.notify_vsync(2);
        let report = thread.stop();
        assert!(report.frames <= 2, "frames = {}", report.frames);
        assert!(report.failure.is_none());
    }

    #[test]
    fn test_fatal_error_stops_thread() {
        let mut device = MockHwcDevice::new();
        device.expect_max_layers().return_const(4usize);
        device.expect_apply_orientation().return_const(true);
        device.expect_register_callbacks().returning(|_| ());
        device.expect_event_control().returning(|_| Ok(()));
        device.expect_blank().returning(|_| Ok(()));
        device.expect_prepare().returning(|_| Err(HwcError::Prepare(-5)));
        let device = Arc::new(device);
        let vsync = Arc::new(VsyncCoordinator::new(device.clone()).unwrap());

        let thread = CompositingThread::start(
            compositor(device, scene_with_alpha(1.0)),
            vsync,
            Duration::from_millis(5),
        )
        .unwrap();
        thread.schedule();

        let deadline = Instant::now() + Duration::from_secs(5);
        while thread.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let report = thread.stop();
        assert_eq!(report.frames, 0);
        assert!(matches!(
            report.failure,
            Some(CompositionError::Hwc(HwcError::Prepare(-5)))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_schedules_frame() {
        let slot: CallbackSlot = Arc::new(Mutex::new(None));
        let sets = Arc::new(AtomicUsize::new(0));
        let device = device_capturing(Arc::clone(&sets), false, Arc::clone(&slot));
        let device = Arc::new(device);
        let vsync = Arc::new(VsyncCoordinator::new(device.clone()).unwrap());
        let events = vsync.take_events().unwrap();

        let thread = CompositingThread::start(
            compositor(device, scene_with_alpha(0.5)),
            Arc::clone(&vsync),
            Duration::from_millis(5),
        )
        .unwrap();
        let forwarder = tokio::spawn(forward_display_events(events, thread.scheduler()));

        let callbacks = slot.lock().clone().unwrap();
        callbacks.invalidate();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sets.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(sets.load(Ordering::SeqCst), 1);

        thread.stop();
        forwarder.abort();
    }
}
