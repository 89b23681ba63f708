//! Render pacing: decide *when* the snapshot is handed to the display.
//!
//! Rendering is idempotent over the full text, so a burst of chunks between
//! two ticks only needs the latest snapshot rendered once. The scheduler
//! tracks a dirty flag; the session drives it from three places:
//!
//! * after each append → [`RenderScheduler::on_append`]
//! * on each display tick → [`RenderScheduler::on_tick`]
//! * at a terminal frame → [`RenderScheduler::flush`] (always renders)
//!
//! How text becomes a display form is the observer's business.

use crate::config::RenderPolicy;
use crate::progress::ConversionObserver;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct RenderScheduler {
    policy: RenderPolicy,
    dirty: bool,
    renders: u64,
}

impl RenderScheduler {
    pub fn new(policy: RenderPolicy) -> Self {
        Self {
            policy,
            dirty: false,
            renders: 0,
        }
    }

    /// Tick length the driver should wake up at, if any.
    pub fn tick(&self) -> Option<Duration> {
        self.policy.tick()
    }

    /// Mark the snapshot dirty; renders right away under
    /// [`RenderPolicy::Immediate`].
    pub fn on_append(&mut self, snapshot: &str, observer: &dyn ConversionObserver) {
        self.dirty = true;
        if self.policy == RenderPolicy::Immediate {
            self.render(snapshot, observer);
        }
    }

    /// Render if anything changed since the last render.
    pub fn on_tick(&mut self, snapshot: &str, observer: &dyn ConversionObserver) -> bool {
        if !self.dirty {
            return false;
        }
        self.render(snapshot, observer);
        true
    }

    /// Unconditional final render before a terminal callback.
    pub fn flush(&mut self, snapshot: &str, observer: &dyn ConversionObserver) {
        self.render(snapshot, observer);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of renders issued so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    fn render(&mut self, snapshot: &str, observer: &dyn ConversionObserver) {
        self.dirty = false;
        self.renders += 1;
        debug!("Render #{}: {} bytes", self.renders, snapshot.len());
        observer.on_snapshot(snapshot);
    }
}
