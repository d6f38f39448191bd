//! Video sync governor
//!
//! Each frame while playing, the governor compares the video element's
//! position with the transport and hard-sets the video to the transport when
//! they differ by more than the threshold. No gradual rate correction.

use crate::clock::ClockSource;
use crate::error::Result;
use log::{debug, info};
use std::time::Duration;

/// Default allowed divergence before a correction, in seconds
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.1;

/// A media element with a read/write playback position.
pub trait VideoElement {
    fn position(&self) -> f64;
    fn set_position(&mut self, seconds: f64);
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
}

/// A correction the governor applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCorrection {
    pub video: f64,
    pub transport: f64,
}

impl DriftCorrection {
    pub fn drift(&self) -> f64 {
        (self.transport - self.video).abs()
    }
}

pub struct VideoSyncGovernor {
    threshold: f64,
    active: bool,
    corrections: u64,
}

impl Default for VideoSyncGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD)
    }
}

impl VideoSyncGovernor {
    pub fn new(threshold: f64) -> Self {
        VideoSyncGovernor {
            threshold: threshold.abs(),
            active: false,
            corrections: 0,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// One frame of governance.
    pub fn tick(
        &mut self,
        transport: f64,
        video: &mut dyn VideoElement,
    ) -> Option<DriftCorrection> {
        if !self.active || video.is_paused() {
            return None;
        }
        let position = video.position();
        if (transport - position).abs() <= self.threshold {
            return None;
        }

        video.set_position(transport);
        self.corrections += 1;
        let correction = DriftCorrection {
            video: position,
            transport,
        };
        debug!(
            "Video drift {:.3}s detected, resynced to {:.3}s",
            correction.drift(),
            transport
        );
        Some(correction)
    }
}

/// A headless video element whose position advances on its own clock at a
/// configurable rate. Stands in for a real player in the CLI and in tests.
pub struct SimulatedVideo {
    clock: Box<dyn ClockSource>,
    rate: f64,
    anchor: f64,
    playing_since: Option<Duration>,
}

impl SimulatedVideo {
    pub fn new(clock: Box<dyn ClockSource>, rate: f64) -> Self {
        SimulatedVideo {
            clock,
            rate,
            anchor: 0.0,
            playing_since: None,
        }
    }
}

impl VideoElement for SimulatedVideo {
    fn position(&self) -> f64 {
        match self.playing_since {
            Some(since) => {
                self.anchor + self.clock.now().saturating_sub(since).as_secs_f64() * self.rate
            }
            None => self.anchor,
        }
    }

    fn set_position(&mut self, seconds: f64) {
        self.anchor = seconds.max(0.0);
        if self.playing_since.is_some() {
            self.playing_since = Some(self.clock.now());
        }
    }

    fn play(&mut self) -> Result<()> {
        if self.playing_since.is_none() {
            self.playing_since = Some(self.clock.now());
            info!("Video playing from {:.3}s", self.anchor);
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.anchor = self.position();
        self.playing_since = None;
    }

    fn is_paused(&self) -> bool {
        self.playing_since.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_inactive_governor_never_corrects() {
        let clock = ManualClock::new();
        let mut video = SimulatedVideo::new(Box::new(clock.clone()), 1.0);
        video.play().unwrap();
        let mut governor = VideoSyncGovernor::default();

        assert_eq!(governor.tick(5.0, &mut video), None);
        assert_eq!(video.position(), 0.0);
    }

    #[test]
    fn test_paused_video_left_alone() {
        let clock = ManualClock::new();
        let mut video = SimulatedVideo::new(Box::new(clock), 1.0);
        let mut governor = VideoSyncGovernor::default();
        governor.start();

        assert_eq!(governor.tick(5.0, &mut video), None);
    }

    #[test]
    fn test_simulated_video_runs_at_rate() {
        let clock = ManualClock::new();
        let mut video = SimulatedVideo::new(Box::new(clock.clone()), 1.5);
        video.play().unwrap();
        clock.advance_secs(2.0);
        assert!((video.position() - 3.0).abs() < 1e-9);

        video.pause();
        clock.advance_secs(2.0);
        assert!((video.position() - 3.0).abs() < 1e-9);
    }
}
