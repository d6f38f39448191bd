//! Transport clock
//!
//! The transport is the single authoritative timeline for playback and
//! recording. Consumers poll [`TransportClock::position`] at their own cadence;
//! nothing is pushed.

use crate::clock::ClockSource;
use log::{debug, info};
use std::time::Duration;

/// What a transport control operation did. The session reacts to these
/// (stop releases sounding notes, seek releases scheduled notes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    Started { position: f64 },
    Stopped { position: f64 },
    Seeked { from: f64, to: f64 },
}

impl TransportEvent {
    /// Position the transport is at after the operation.
    pub fn position(&self) -> f64 {
        match *self {
            TransportEvent::Started { position } | TransportEvent::Stopped { position } => position,
            TransportEvent::Seeked { to, .. } => to,
        }
    }
}

pub struct TransportClock {
    clock: Box<dyn ClockSource>,
    // Position at the last start/stop/seek
    anchor: f64,
    // Clock reading when the transport last started running
    running_since: Option<Duration>,
}

impl TransportClock {
    pub fn new(clock: Box<dyn ClockSource>) -> Self {
        TransportClock {
            clock,
            anchor: 0.0,
            running_since: None,
        }
    }

    /// Resumes advancement from the current position.
    pub fn start(&mut self) -> TransportEvent {
        if self.running_since.is_none() {
            self.running_since = Some(self.clock.now());
            info!("Transport started at {:.3}s", self.anchor);
        }
        TransportEvent::Started {
            position: self.anchor,
        }
    }

    /// Freezes the position. Always reported, even when already stopped, so
    /// the all-notes-off safety action runs on every stop.
    pub fn stop(&mut self) -> TransportEvent {
        self.anchor = self.position();
        if self.running_since.take().is_some() {
            info!("Transport stopped at {:.3}s", self.anchor);
        }
        TransportEvent::Stopped {
            position: self.anchor,
        }
    }

    /// Moves the position to `target`, clamped at zero. In-flight scheduled
    /// notes are the caller's concern.
    pub fn seek(&mut self, target: f64) -> TransportEvent {
        let from = self.position();
        let to = if target.is_finite() { target.max(0.0) } else { 0.0 };
        self.anchor = to;
        if self.running_since.is_some() {
            self.running_since = Some(self.clock.now());
        }
        debug!("Transport seek {:.3}s -> {:.3}s", from, to);
        TransportEvent::Seeked { from, to }
    }

    pub fn position(&self) -> f64 {
        match self.running_since {
            Some(since) => {
                let elapsed = self.clock.now().saturating_sub(since);
                self.anchor + elapsed.as_secs_f64()
            }
            None => self.anchor,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }
}
