//! Vsync coordination
//!
//! The hardware delivers vsync, hotplug and invalidate notifications on its
//! own thread. [`VsyncCoordinator`] registers a forwarder that only records a
//! vsync (and wakes waiters) or enqueues a [`DisplayEvent`]; all compositor
//! logic runs on the threads that wait.

use crate::error::HwcError;
use crate::hwc::device::{HwcCallbacks, HwcDevice};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Display notifications other than vsync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Hotplug { display: i32, connected: bool },
    /// The hardware asks for the screen to be recomposited
    Invalidate,
}

#[derive(Debug, Default)]
struct VsyncState {
    count: u64,
    last_timestamp_ns: i64,
}

#[derive(Debug, Default)]
struct VsyncSignal {
    state: Mutex<VsyncState>,
    cond: Condvar,
}

impl VsyncSignal {
    fn notify(&self, timestamp_ns: i64) {
        let mut state = self.state.lock();
        state.count += 1;
        state.last_timestamp_ns = timestamp_ns;
        self.cond.notify_all();
    }
}

/// Registered with the hardware. Runs on the hardware callback thread.
struct CallbackForwarder {
    signal: Arc<VsyncSignal>,
    events: UnboundedSender<DisplayEvent>,
}

impl HwcCallbacks for CallbackForwarder {
    fn vsync(&self, _display: i32, timestamp_ns: i64) {
        self.signal.notify(timestamp_ns);
    }

    fn hotplug(&self, display: i32, connected: bool) {
        // A closed channel means the compositor is shutting down
        let _ = self.events.send(DisplayEvent::Hotplug { display, connected });
    }

    fn invalidate(&self) {
        let _ = self.events.send(DisplayEvent::Invalidate);
    }
}

pub struct VsyncCoordinator {
    device: Arc<dyn HwcDevice>,
    signal: Arc<VsyncSignal>,
    events: Mutex<Option<UnboundedReceiver<DisplayEvent>>>,
}

impl VsyncCoordinator {
    /// Registers for notifications, enables vsync and unblanks the display.
    /// Any failure means the device cannot be used.
    pub fn new(device: Arc<dyn HwcDevice>) -> Result<Self, HwcError> {
        let signal = Arc::new(VsyncSignal::default());
        let (tx, rx) = mpsc::unbounded_channel();

        device.register_callbacks(Arc::new(CallbackForwarder {
            signal: Arc::clone(&signal),
            events: tx,
        }));
        device.event_control(true)?;
        if let Err(e) = device.blank(false) {
            if let Err(cleanup) = device.event_control(false) {
                warn!("⚠️ Could not disable vsync after failed unblank: {}", cleanup);
            }
            return Err(e);
        }

        info!("📺 Display unblanked, vsync enabled");
        Ok(Self {
            device,
            signal,
            events: Mutex::new(Some(rx)),
        })
    }

    /// Blocks until the next vsync and returns its timestamp
    pub fn wait_for_vsync(&self) -> i64 {
        let mut state = self.signal.state.lock();
        let seen = state.count;
        while state.count == seen {
            self.signal.cond.wait(&mut state);
        }
        state.last_timestamp_ns
    }

    /// Like [`wait_for_vsync`](Self::wait_for_vsync) but gives up after
    /// `timeout`, returning `None`
    pub fn wait_for_vsync_timeout(&self, timeout: Duration) -> Option<i64> {
        let deadline = Instant::now() + timeout;
        let mut state = self.signal.state.lock();
        let seen = state.count;
        while state.count == seen {
            if self.signal.cond.wait_until(&mut state, deadline).timed_out() {
                return (state.count != seen).then_some(state.last_timestamp_ns);
            }
        }
        Some(state.last_timestamp_ns)
    }

    /// Records a vsync from a source other than the hardware callback
    pub fn notify_vsync(&self, timestamp_ns: i64) {
        self.signal.notify(timestamp_ns);
    }

    pub fn vsync_count(&self) -> u64 {
        self.signal.state.lock().count
    }

    pub fn last_timestamp_ns(&self) -> i64 {
        self.signal.state.lock().last_timestamp_ns
    }

    /// Hands out the hotplug/invalidate queue. Only the first caller gets it.
    pub fn take_events(&self) -> Option<UnboundedReceiver<DisplayEvent>> {
        self.events.lock().take()
    }

    pub fn device(&self) -> &Arc<dyn HwcDevice> {
        &self.device
    }
}

impl Drop for VsyncCoordinator {
    fn drop(&mut self) {
        debug!("📺 Blanking display and disabling vsync");
        if let Err(e) = self.device.blank(true) {
            warn!("⚠️ Failed to blank display on shutdown: {}", e);
        }
        if let Err(e) = self.device.event_control(false) {
            warn!("⚠️ Failed to disable vsync on shutdown: {}", e);
        }
    }
}
