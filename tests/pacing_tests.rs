//! Vsync coordination and the compositing thread on simulated hardware

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strata::buffer::{Buffer, PixelFormat};
use strata::compositor::{forward_display_events, CompositingThread, DisplayBufferCompositor, SharedScene};
use strata::geometry::{Rectangle, Size};
use strata::renderable::{Renderable, RenderableId, SurfaceRenderable};
use strata::sim::{SimHwcConfig, SimPlatform};
use strata::snapshot::{SnapshotStrategy, ThreadedSnapshotStrategy};
use strata::vsync::{DisplayEvent, VsyncCoordinator};
use strata::StrataConfig;

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

fn platform() -> SimPlatform {
    SimPlatform::with_size(
        SimHwcConfig::default(),
        &StrataConfig::default(),
        Size::new(160, 120),
    )
}

fn scene(platform: &SimPlatform, alpha: f32) -> Arc<SharedScene> {
    let buffer: Arc<dyn Buffer> = platform
        .allocator()
        .allocate(Size::new(16, 16), PixelFormat::Abgr8888)
        .unwrap();
    let renderable: Arc<dyn Renderable> = Arc::new(
        SurfaceRenderable::new(RenderableId(1), buffer, Rectangle::from_xywh(0, 0, 16, 16))
            .with_alpha(alpha),
    );
    Arc::new(SharedScene::new(vec![renderable]))
}

#[test]
fn test_coordinator_unblanks_and_blanks_hardware() {
    let platform = platform();
    let hwc = Arc::clone(platform.hwc());
    assert!(hwc.is_blanked());

    let vsync = VsyncCoordinator::new(hwc.clone()).unwrap();
    assert!(!hwc.is_blanked());
    assert!(hwc.vsync_enabled());

    drop(vsync);
    assert!(hwc.is_blanked());
    assert!(!hwc.vsync_enabled());
}

#[test]
fn test_hardware_vsync_reaches_waiter() {
    let platform = platform();
    let hwc = Arc::clone(platform.hwc());
    let vsync = Arc::new(VsyncCoordinator::new(hwc.clone()).unwrap());

    let waiter = Arc::clone(&vsync);
    let handle = thread::spawn(move || waiter.wait_for_vsync_timeout(Duration::from_secs(5)));

    // keep firing until the waiter has picked one up
    assert!(wait_until(|| {
        hwc.fire_vsync();
        handle.is_finished()
    }));
    let timestamp = handle.join().unwrap();
    assert!(timestamp.is_some());
    assert!(vsync.vsync_count() >= 1);
}

#[test]
fn test_hotplug_is_queued_as_event() {
    let platform = platform();
    let hwc = Arc::clone(platform.hwc());
    let vsync = VsyncCoordinator::new(hwc.clone()).unwrap();
    let mut events = vsync.take_events().unwrap();

    hwc.fire_hotplug(false);

    assert_eq!(
        events.try_recv().unwrap(),
        DisplayEvent::Hotplug {
            display: 0,
            connected: false
        }
    );
}

#[test]
fn test_thread_composites_one_frame_per_vsync() {
    let platform = platform();
    let config = StrataConfig::default();
    let hwc = Arc::clone(platform.hwc());
    let vsync = Arc::new(VsyncCoordinator::new(hwc.clone()).unwrap());
    let (display, _gl) = platform.create_display(&config).unwrap();
    let compositor = DisplayBufferCompositor::new(display, scene(&platform, 0.5));

    // a vsync fired before the thread starts waiting is missed; the short
    // timeout keeps that from stalling the loop
    let thread =
        CompositingThread::start(compositor, Arc::clone(&vsync), Duration::from_millis(20))
            .unwrap();

    for frame in 1..=5 {
        thread.schedule();
        assert!(wait_until(|| hwc.commit_count() >= frame));
        hwc.fire_vsync();
    }

    let report = thread.stop();
    assert!(report.failure.is_none());
    assert!(report.frames >= 5);
    assert_eq!(report.gpu_frames, report.frames);
}

#[test]
fn test_thread_stops_on_device_failure() {
    let platform = platform();
    let config = StrataConfig::default();
    let hwc = Arc::clone(platform.hwc());
    let vsync = Arc::new(VsyncCoordinator::new(hwc.clone()).unwrap());
    let (display, _gl) = platform.create_display(&config).unwrap();
    let compositor = DisplayBufferCompositor::new(display, scene(&platform, 1.0));

    let thread =
        CompositingThread::start(compositor, vsync, Duration::from_millis(5)).unwrap();
    hwc.fail_next_prepare();
    thread.schedule();

    assert!(wait_until(|| !thread.is_running()));
    let report = thread.stop();
    assert!(report.failure.map_or(false, |e| e.is_fatal()));
}

#[tokio::test]
async fn test_invalidate_triggers_recomposition() {
    let platform = platform();
    let config = StrataConfig::default();
    let hwc = Arc::clone(platform.hwc());
    let vsync = Arc::new(VsyncCoordinator::new(hwc.clone()).unwrap());
    let events = vsync.take_events().unwrap();
    let (display, _gl) = platform.create_display(&config).unwrap();
    let compositor = DisplayBufferCompositor::new(display, scene(&platform, 0.5));

    let thread =
        CompositingThread::start(compositor, Arc::clone(&vsync), Duration::from_millis(5)).unwrap();
    let forwarder = tokio::spawn(forward_display_events(events, thread.scheduler()));

    hwc.fire_invalidate();

    let deadline = Instant::now() + Duration::from_secs(5);
    while hwc.commit_count() == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(hwc.commit_count(), 1);

    thread.stop();
    forwarder.abort();
}

#[test]
fn test_snapshot_of_buffer_on_screen() {
    let platform = platform();
    let config = StrataConfig::default();
    let (mut display, _gl) = platform.create_display(&config).unwrap();
    let buffer = platform
        .allocator()
        .allocate(Size::new(4, 4), PixelFormat::Abgr8888)
        .unwrap();
    buffer.fill([0x11, 0x22, 0x33, 0xff]).unwrap();
    let client: Arc<dyn Buffer> = buffer;
    let renderable: Arc<dyn Renderable> = Arc::new(SurfaceRenderable::new(
        RenderableId(1),
        Arc::clone(&client),
        Rectangle::from_xywh(0, 0, 4, 4),
    ));

    // scanned out as an overlay, so the hardware is still reading it
    assert!(display
        .post_renderables_if_optimizable(&vec![renderable])
        .unwrap());
    assert!(client.native_buffer().has_pending_work());

    let (tx, rx) = std::sync::mpsc::channel();
    ThreadedSnapshotStrategy::new().take_snapshot_of(
        client,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    let snapshot = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(snapshot.size, Size::new(4, 4));
    assert_eq!(&snapshot.pixels[..4], &[0x11, 0x22, 0x33, 0xff]);
}
