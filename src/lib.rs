//! synthwave: recording and playback synchronization core.
//!
//! A single transport clock drives MIDI file playback, live MIDI recording,
//! and video drift correction. See [`session::Session`] for the control
//! surface.

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod midi;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod spawner;
pub mod transport;
pub mod ui;
pub mod video;

pub use cli::{validate_device, Args};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::Settings;
pub use error::{Result, SyncError};
pub use scheduler::{MidiFileScheduler, ScheduledEvent};
pub use session::{
    Notification, NotificationLevel, PendingTransition, Session, SessionOptions, SessionState,
};
pub use spawner::{Task, TaskSpawner, ThreadSpawner};
pub use transport::{TransportClock, TransportEvent};
pub use video::{SimulatedVideo, VideoElement, VideoSyncGovernor};
