//! Session control
//!
//! The session owns every component explicitly (transport, scheduler,
//! output dispatcher, input listener, recording buffer, video governor) and
//! runs the overall state machine:
//!
//! - Idle --play--> Playing --stop--> Idle
//! - Idle or Playing --record--> Recording (recording implies playing)
//! - Recording --stop or record--> Idle, finalizing the session with the
//!   recording service
//!
//! Transitions into and out of Recording wait on the recording service. The
//! request goes to a [`ServiceWorker`] and the state only changes when its
//! reply comes back through [`Session::handle_service_event`]. Until then
//! the transition is pending: the transport keeps running, input keeps being
//! captured, and further record toggles are refused.
//!
//! Nothing here is fatal. Failures are logged and queued as notifications
//! for the front end; service failures roll the transition back.

use crate::clock::ClockSource;
use crate::config::Settings;
use crate::midi::input::{ActiveNotes, InputChange, InputPorts, MidiInputListener, RawInput};
use crate::midi::output::{DeviceId, MidiOutputDevice, MidiOutputDispatcher, OutputBackend};
use crate::midi::recording::{RecordedNote, RecordingBuffer};
use crate::midi::source::MidiSource;
use crate::scheduler::{MidiFileScheduler, ScheduledEvent};
use crate::service::{
    DeviceSelections, LatestTake, RecordingService, ServiceEvent, ServiceRequest, ServiceWorker,
};
use crate::spawner::TaskSpawner;
use crate::transport::TransportClock;
use crate::video::{VideoElement, VideoSyncGovernor, DEFAULT_DRIFT_THRESHOLD};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    /// Recording and playing
    Recording,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Playing => "Playing",
            SessionState::Recording => "Recording",
        };
        f.pad(name)
    }
}

/// A recording transition waiting on the service's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTransition {
    Starting,
    Stopping,
}

impl fmt::Display for PendingTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            PendingTransition::Starting => "starting",
            PendingTransition::Stopping => "stopping",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A visible, non-fatal message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub drift_threshold: f64,
    pub midi_thru: bool,
    /// Local fallback when the service has no stored selections
    pub selections: DeviceSelections,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            midi_thru: false,
            selections: DeviceSelections::default(),
        }
    }
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        SessionOptions {
            drift_threshold: settings.drift_threshold,
            midi_thru: settings.midi_thru,
            selections: settings.device_selections(),
        }
    }
}

pub struct Session {
    transport: TransportClock,
    scheduler: MidiFileScheduler,
    dispatcher: MidiOutputDispatcher,
    listener: MidiInputListener,
    buffer: RecordingBuffer,
    governor: VideoSyncGovernor,
    video: Option<Box<dyn VideoElement>>,
    service: ServiceWorker,
    pending: Option<PendingTransition>,
    input_ports: Box<dyn InputPorts>,
    input_tx: Sender<RawInput>,
    input_rx: Receiver<RawInput>,
    selections: DeviceSelections,
    midi_thru: bool,
    state: SessionState,
    take: Option<LatestTake>,
    last_session_id: Option<String>,
    notifications: Vec<Notification>,
}

impl Session {
    pub fn new(
        clock: Box<dyn ClockSource>,
        outputs: Box<dyn OutputBackend>,
        input_ports: Box<dyn InputPorts>,
        service: Box<dyn RecordingService>,
        spawner: Box<dyn TaskSpawner>,
        options: SessionOptions,
    ) -> Self {
        let (input_tx, input_rx) = unbounded();
        Session {
            transport: TransportClock::new(clock),
            scheduler: MidiFileScheduler::new(),
            dispatcher: MidiOutputDispatcher::new(outputs),
            listener: MidiInputListener::new(),
            buffer: RecordingBuffer::new(),
            governor: VideoSyncGovernor::new(options.drift_threshold),
            video: None,
            service: ServiceWorker::new(service, spawner),
            pending: None,
            input_ports,
            input_tx,
            input_rx,
            selections: options.selections,
            midi_thru: options.midi_thru,
            state: SessionState::Idle,
            take: None,
            last_session_id: None,
            notifications: Vec::new(),
        }
    }

    pub fn attach_video(&mut self, video: Box<dyn VideoElement>) {
        self.video = Some(video);
    }

    /// Receiving end of the hardware input channel, for the event loop.
    pub fn input_receiver(&self) -> Receiver<RawInput> {
        self.input_rx.clone()
    }

    /// Receiving end of the service replies, for the event loop.
    pub fn service_receiver(&self) -> Receiver<ServiceEvent> {
        self.service.events()
    }

    // ---- devices ----

    pub fn input_port_names(&self) -> Vec<String> {
        self.input_ports.port_names()
    }

    pub fn output_devices(&self) -> Vec<MidiOutputDevice> {
        self.dispatcher.devices()
    }

    /// Switches the input subscription to `port`. Notes still held on the
    /// old port get note-offs at the current position. A missing port
    /// leaves input disabled and is notified.
    pub fn bind_input(&mut self, port: Option<&str>) -> bool {
        let position = self.transport.position();
        for note in self.listener.unbind() {
            debug!("Releasing {} held on previous input port", note.name);
            self.buffer.note_off(note.pitch, position);
            if self.midi_thru {
                self.dispatcher.send_note_off(note.pitch);
            }
        }

        let bound = self
            .listener
            .bind(self.input_ports.as_ref(), port, &self.input_tx);
        self.selections.midi_port_name = port.map(str::to_string);
        if let (false, Some(port)) = (bound, port) {
            self.notify(
                NotificationLevel::Error,
                format!("MIDI input unavailable: {}", port),
            );
        }
        bound
    }

    pub fn bound_input(&self) -> Option<&str> {
        self.listener.bound_port()
    }

    pub fn select_output(&mut self, id: &DeviceId) -> bool {
        match self.dispatcher.select(id) {
            Ok(()) => {
                let name = self
                    .dispatcher
                    .selected()
                    .map(|d| d.name.clone())
                    .unwrap_or_default();
                self.notify(NotificationLevel::Info, format!("MIDI Output: {}", name));
                true
            }
            Err(e) => {
                warn!("Could not select MIDI output {}: {}", id, e);
                self.notify(NotificationLevel::Error, format!("MIDI output unavailable: {}", id));
                false
            }
        }
    }

    pub fn select_preferred_output(&mut self) -> Option<DeviceId> {
        self.dispatcher.select_preferred()
    }

    pub fn selected_output(&self) -> Option<&MidiOutputDevice> {
        self.dispatcher.selected()
    }

    pub fn set_midi_thru(&mut self, enabled: bool) {
        info!("MIDI thru {}", if enabled { "enabled" } else { "disabled" });
        self.midi_thru = enabled;
    }

    pub fn midi_thru(&self) -> bool {
        self.midi_thru
    }

    // ---- control ----

    pub fn play(&mut self) {
        if self.state == SessionState::Idle {
            self.start_playback();
            self.state = SessionState::Playing;
        }
    }

    /// Stops playback. While recording, the stop is only requested here:
    /// recording carries on until the service confirms, and a failed stop
    /// leaves it running so the stop can be retried.
    pub fn stop(&mut self) {
        if self.state == SessionState::Recording {
            if let Some(pending) = self.pending {
                debug!("Stop ignored, recording is already {}", pending);
                return;
            }
            self.pending = Some(PendingTransition::Stopping);
            self.service.submit(ServiceRequest::Stop);
            return;
        }
        self.halt_playback();
        self.state = SessionState::Idle;
    }

    pub fn seek(&mut self, target: f64) {
        let to = self.transport.seek(target).position();
        self.scheduler.seek(to, &mut self.dispatcher);
        if let Some(video) = self.video.as_deref_mut() {
            video.set_position(to);
        }
    }

    pub fn rewind(&mut self) {
        self.seek(0.0);
    }

    /// Requests a recording start, or a stop while recording. Refused while
    /// an earlier request is still waiting on the service.
    pub fn toggle_record(&mut self) {
        if let Some(pending) = self.pending {
            self.notify(
                NotificationLevel::Info,
                format!("Recording is {}, please wait", pending),
            );
            return;
        }
        if self.state == SessionState::Recording {
            self.stop();
            return;
        }

        self.pending = Some(PendingTransition::Starting);
        self.service.submit(ServiceRequest::Start {
            fallback: self.selections.clone(),
        });
    }

    /// Applies a reply from the recording service.
    pub fn handle_service_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Started(result) => self.finish_start(result),
            ServiceEvent::Stopped(result) => self.finish_stop(result),
            ServiceEvent::LatestTake(result) => self.apply_latest_take(result),
            ServiceEvent::Source { url, result } => match result {
                Ok(bytes) => {
                    self.load_source_bytes(&bytes);
                }
                Err(e) => {
                    error!("Failed to fetch MIDI source {}: {}", url, e);
                    self.notify(NotificationLevel::Error, format!("Failed to fetch MIDI: {}", e));
                }
            },
        }
    }

    /// Applies every reply that has already arrived.
    pub fn pump_service(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.service.try_event() {
            self.handle_service_event(event);
            handled += 1;
        }
        handled
    }

    // ---- drivers ----

    /// Frame callback. Does nothing while the transport is stopped.
    pub fn tick(&mut self) -> f64 {
        let position = self.transport.position();
        if !self.transport.is_running() {
            return position;
        }

        self.scheduler.advance(position, &mut self.dispatcher);
        if let Some(video) = self.video.as_deref_mut() {
            self.governor.tick(position, video);
        }
        position
    }

    pub fn handle_input(&mut self, raw: &RawInput) {
        let position = self.transport.position();
        let Some(change) = self.listener.handle_raw(raw, position, &mut self.buffer) else {
            return;
        };
        if self.midi_thru {
            match change {
                InputChange::NoteOn(note) => self.dispatcher.send_note_on(note.pitch, note.velocity),
                InputChange::NoteOff { pitch } => self.dispatcher.send_note_off(pitch),
            }
        }
    }

    /// Handles everything queued on the input channel.
    pub fn pump_input(&mut self) -> usize {
        let pending: Vec<RawInput> = self.input_rx.try_iter().collect();
        for raw in &pending {
            self.handle_input(raw);
        }
        pending.len()
    }

    // ---- sources ----

    /// Parses `bytes` and installs the primary track as the schedule. A
    /// malformed source clears the schedule and leaves everything else as is.
    pub fn load_source_bytes(&mut self, bytes: &[u8]) -> bool {
        match MidiSource::parse(bytes) {
            Ok(source) => {
                let notes = source
                    .primary_track()
                    .map(|t| t.notes.as_slice())
                    .unwrap_or(&[]);
                let position = self.transport.position();
                self.scheduler.load(notes, position, &mut self.dispatcher);
                true
            }
            Err(e) => {
                error!("Failed to load MIDI: {}", e);
                self.scheduler.clear(&mut self.dispatcher);
                self.notify(NotificationLevel::Error, format!("Failed to load MIDI: {}", e));
                false
            }
        }
    }

    pub fn load_source_file(&mut self, path: &Path) -> bool {
        match std::fs::read(path) {
            Ok(bytes) => self.load_source_bytes(&bytes),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                self.notify(
                    NotificationLevel::Error,
                    format!("Failed to read {}: {}", path.display(), e),
                );
                false
            }
        }
    }

    /// Requests a source from the service; it is loaded when it arrives.
    pub fn load_source_url(&mut self, url: &str) {
        self.service.submit(ServiceRequest::FetchSource(url.to_string()));
    }

    /// Requests the latest take's artifacts. Its MIDI is fetched and
    /// scheduled once they arrive.
    pub fn load_latest_take(&mut self) {
        self.service.submit(ServiceRequest::LatestTake);
    }

    /// The finished notes of the current (or last) take as a source.
    pub fn recorded_source(&self) -> MidiSource {
        MidiSource::from_recorded(self.buffer.notes())
    }

    /// Writes the recorded notes to `path`: JSON for `.json`, a Standard
    /// MIDI File otherwise. The outcome is notified either way.
    pub fn export_recording(&mut self, path: &Path) -> bool {
        match self.write_recording(path) {
            Ok(()) => {
                self.notify(
                    NotificationLevel::Info,
                    format!("Exported recording to {}", path.display()),
                );
                true
            }
            Err(e) => {
                error!("Export to {} failed: {}", path.display(), e);
                self.notify(
                    NotificationLevel::Error,
                    format!("Export to {} failed: {}", path.display(), e),
                );
                false
            }
        }
    }

    // ---- read-only state ----

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.transport.position()
    }

    pub fn is_playing(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn pending_transition(&self) -> Option<PendingTransition> {
        self.pending
    }

    /// True while a start or stop waits on the recording service.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn active_notes(&self) -> &ActiveNotes {
        self.listener.active_notes()
    }

    pub fn recorded_notes(&self) -> &[RecordedNote] {
        self.buffer.notes()
    }

    pub fn scheduled_events(&self) -> &[ScheduledEvent] {
        self.scheduler.events()
    }

    pub fn take(&self) -> Option<&LatestTake> {
        self.take.as_ref()
    }

    pub fn last_session_id(&self) -> Option<&str> {
        self.last_session_id.as_deref()
    }

    pub fn video_corrections(&self) -> u64 {
        self.governor.corrections()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // ---- internals ----

    fn start_playback(&mut self) {
        self.transport.start();
        if let Some(video) = self.video.as_deref_mut() {
            if let Err(e) = video.play() {
                error!("Video play failed: {}", e);
            }
        }
        self.governor.start();
    }

    fn halt_playback(&mut self) {
        self.governor.stop();
        self.transport.stop();
        self.scheduler.stop(&mut self.dispatcher);
        self.dispatcher.all_notes_off();
        if let Some(video) = self.video.as_deref_mut() {
            video.pause();
        }
    }

    fn finish_start(&mut self, result: crate::Result<DeviceSelections>) {
        self.pending = None;
        match result {
            Ok(selections) => {
                debug!("Service recording with {:?}", selections);
                self.buffer.set_recording(true);
                if self.state == SessionState::Idle {
                    self.start_playback();
                }
                self.state = SessionState::Recording;
                self.notify(NotificationLevel::Info, "Recording started".to_string());
            }
            Err(e) => {
                error!("Start recording error: {}", e);
                self.notify(NotificationLevel::Error, format!("Recording Error: {}", e));
            }
        }
    }

    fn finish_stop(&mut self, result: crate::Result<String>) {
        self.pending = None;
        match result {
            Ok(session_id) => {
                self.buffer.set_recording(false);
                self.notify(
                    NotificationLevel::Info,
                    format!("Recording saved (Session ID: {})", session_id),
                );
                self.last_session_id = Some(session_id);
                self.halt_playback();
                self.state = SessionState::Idle;
                self.load_latest_take();
            }
            Err(e) => {
                error!("Stop recording error: {}", e);
                self.notify(NotificationLevel::Error, format!("Stop Error: {}", e));
            }
        }
    }

    fn apply_latest_take(&mut self, result: crate::Result<LatestTake>) {
        match result {
            Ok(take) => {
                if take.video.is_some() || take.midi.is_some() {
                    self.notify(
                        NotificationLevel::Info,
                        "Timeline updated with latest take".to_string(),
                    );
                }
                if let Some(url) = &take.midi {
                    self.load_source_url(url);
                }
                self.take = Some(take);
            }
            Err(e) => {
                error!("Error loading latest take: {}", e);
                self.notify(NotificationLevel::Error, "Failed to load latest take".to_string());
            }
        }
    }

    fn write_recording(&self, path: &Path) -> crate::Result<()> {
        let source = self.recorded_source();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let bytes = if is_json {
            source.to_json()?.into_bytes()
        } else {
            source.to_smf()?
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn notify(&mut self, level: NotificationLevel, message: String) {
        match level {
            NotificationLevel::Info => info!("{}", message),
            NotificationLevel::Error => warn!("{}", message),
        }
        self.notifications.push(Notification { level, message });
    }
}
