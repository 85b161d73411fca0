//! Synchronization fences
//!
//! A [`Fence`] represents a future point of hardware completion: "the GPU has
//! finished writing this buffer", "the display has stopped scanning it out".
//! Fences are move-only. Handing the same completion to a second party is an
//! explicit [`Fence::copy`], and combining two completions is an explicit
//! [`Fence::merge`]. There is no implicit duplication.
//!
//! Completion points are produced by a [`Timeline`] (a software analogue of a
//! kernel sync timeline) and signalled by whoever owns the work.

use crate::error::FenceError;
use log::{trace, warn};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on any fence wait before it is treated as a hardware hang
pub const DEFAULT_WAIT_CEILING: Duration = Duration::from_secs(5);

/// A single completion point on a timeline
pub struct SyncPoint {
    timeline: Arc<str>,
    seqno: u64,
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl SyncPoint {
    /// Marks the point as reached and wakes every waiter
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            *signaled = true;
            trace!("fence {}:{} signaled", self.timeline, self.seqno);
        }
        self.cond.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Returns false if the deadline passed first
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}

impl fmt::Debug for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPoint")
            .field("timeline", &self.timeline)
            .field("seqno", &self.seqno)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

/// Source of monotonically numbered completion points
#[derive(Debug)]
pub struct Timeline {
    name: Arc<str>,
    next: AtomicU64,
}

impl Timeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            next: AtomicU64::new(1),
        }
    }

    /// Creates a new, unsignalled completion point
    pub fn create_point(&self) -> Arc<SyncPoint> {
        let seqno = self.next.fetch_add(1, Ordering::Relaxed);
        Arc::new(SyncPoint {
            timeline: Arc::clone(&self.name),
            seqno,
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    /// Creates a fence plus the point that will signal it
    pub fn create_fence(&self) -> (Fence, Arc<SyncPoint>) {
        let point = self.create_point();
        (Fence::from_point(Arc::clone(&point)), point)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Move-only handle on zero or more outstanding completion points.
///
/// An empty fence is already satisfied (the equivalent of a `-1` fence fd).
#[derive(Default)]
pub struct Fence {
    points: Vec<Arc<SyncPoint>>,
}

impl Fence {
    /// A fence that is already satisfied
    pub fn signaled() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_point(point: Arc<SyncPoint>) -> Self {
        Self {
            points: vec![point],
        }
    }

    /// Whether this fence still refers to any completion point
    pub fn is_valid(&self) -> bool {
        !self.points.is_empty()
    }

    /// Whether every completion point this fence waits on has been reached
    pub fn is_signaled(&self) -> bool {
        self.points.iter().all(|p| p.is_signaled())
    }

    /// Explicit duplicate for handing the same completion to another party
    pub fn copy(&self) -> Fence {
        Fence {
            points: self.points.clone(),
        }
    }

    /// Folds `other` into this fence. The result is satisfied only when both
    /// the original and `other` are satisfied.
    pub fn merge(&mut self, other: Fence) {
        self.points.retain(|p| !p.is_signaled());
        for point in other.points {
            if point.is_signaled() || self.points.iter().any(|p| Arc::ptr_eq(p, &point)) {
                continue;
            }
            self.points.push(point);
        }
    }

    /// Consuming form of [`Fence::merge`]
    pub fn merged(mut self, other: Fence) -> Fence {
        self.merge(other);
        self
    }

    /// Takes the completion points out, leaving this fence satisfied
    pub fn take(&mut self) -> Fence {
        std::mem::take(self)
    }

    /// Blocks until satisfied or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Result<(), FenceError> {
        let start = Instant::now();
        let deadline = start + timeout;
        for point in &self.points {
            if !point.wait_until(deadline) {
                warn!(
                    "⏳ Fence {}:{} did not signal within {:?}",
                    point.timeline, point.seqno, timeout
                );
                return Err(FenceError::Timeout {
                    waited: start.elapsed(),
                });
            }
        }
        Ok(())
    }

    /// Number of completion points still referenced (signalled or not)
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.points.iter().filter(|p| !p.is_signaled()).count();
        f.debug_struct("Fence")
            .field("points", &self.points.len())
            .field("pending", &pending)
            .finish()
    }
}
