//! Event loop
//!
//! The session is driven from one thread by four sources: hardware input
//! pushed over a channel, replies from the recording service, a frame ticker
//! that only fires while the transport is playing, and user commands.

use crate::midi::output::DeviceId;
use crate::midi::RawInput;
use crate::service::ServiceEvent;
use crate::session::{Session, SessionState};
use crate::spawner::TaskSpawner;
use crate::ui::StatusLine;
use chrono::Local;
use crossbeam::channel::{never, select, tick, Receiver, Sender};
use log::{debug, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How long shutdown waits for the service to confirm a pending stop.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// A stop that keeps failing is not retried forever on the way out.
const SHUTDOWN_STOP_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Stop,
    Seek(f64),
    Rewind,
    Record,
    LoadLatest,
    Load(PathBuf),
    SelectOutput(DeviceId),
    /// `None` disables input
    BindInput(Option<String>),
    Thru(bool),
    Export(Option<PathBuf>),
    Quit,
}

/// Parses one line of user input. Blank or unknown lines give `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match (word.to_ascii_lowercase().as_str(), rest) {
        ("play", "") => Command::Play,
        ("stop", "") => Command::Stop,
        ("seek", secs) => Command::Seek(secs.parse().ok()?),
        ("rewind", "") => Command::Rewind,
        ("rec", "") | ("record", "") => Command::Record,
        ("latest", "") => Command::LoadLatest,
        ("load", path) if !path.is_empty() => Command::Load(PathBuf::from(path)),
        ("out", id) if !id.is_empty() => Command::SelectOutput(DeviceId::new(id)),
        ("in", "") | ("in", "none") => Command::BindInput(None),
        ("in", port) => Command::BindInput(Some(port.to_string())),
        ("thru", "on") => Command::Thru(true),
        ("thru", "off") => Command::Thru(false),
        ("export", "") => Command::Export(None),
        ("export", path) => Command::Export(Some(PathBuf::from(path))),
        ("quit", "") | ("q", "") | ("exit", "") => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// `take_YYYYmmdd_HHMMSS.mid`
pub fn default_export_path() -> PathBuf {
    PathBuf::from(format!("take_{}.mid", Local::now().format("%Y%m%d_%H%M%S")))
}

/// Reads commands from stdin until EOF or `quit`.
pub fn spawn_stdin_reader(spawner: &dyn TaskSpawner, tx: Sender<Command>) {
    spawner.spawn(Box::new(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    let quit = command == Command::Quit;
                    if tx.send(command).is_err() || quit {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command: {}", line.trim()),
            }
        }
        let _ = tx.send(Command::Quit);
    }));
}

pub struct EventLoop {
    session: Session,
    commands: Receiver<Command>,
    input: Receiver<RawInput>,
    service_events: Receiver<ServiceEvent>,
    frame_interval: Duration,
    shutdown_grace: Duration,
    status: StatusLine,
}

impl EventLoop {
    pub fn new(session: Session, commands: Receiver<Command>, frame_interval: Duration) -> Self {
        let input = session.input_receiver();
        let service_events = session.service_receiver();
        EventLoop {
            session,
            commands,
            input,
            service_events,
            frame_interval,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            status: StatusLine::hidden(),
        }
    }

    pub fn with_status(mut self, status: StatusLine) -> Self {
        self.status = status;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Runs until `Quit` or until every command sender is gone, then stops
    /// the session, waiting up to the shutdown grace for the recording
    /// service to confirm.
    pub fn run(&mut self) {
        info!("Event loop started");
        let frames = tick(self.frame_interval);
        let idle = never::<Instant>();
        let input = self.input.clone();
        let commands = self.commands.clone();
        let service_events = self.service_events.clone();

        loop {
            let frame_source = if self.session.is_playing() {
                &frames
            } else {
                &idle
            };

            select! {
                recv(input) -> msg => {
                    if let Ok(raw) = msg {
                        self.session.handle_input(&raw);
                    }
                }
                recv(service_events) -> msg => {
                    if let Ok(event) = msg {
                        self.session.handle_service_event(event);
                    }
                }
                recv(commands) -> msg => match msg {
                    Ok(Command::Quit) | Err(_) => break,
                    Ok(command) => self.apply(command),
                },
                recv(frame_source) -> _ => {
                    self.session.tick();
                }
            }
            self.refresh();
        }

        self.shut_down();
        self.refresh();
        self.status.finish();
        info!("Event loop finished");
    }

    pub fn apply(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::Play => self.session.play(),
            Command::Stop => self.session.stop(),
            Command::Seek(secs) => self.session.seek(secs),
            Command::Rewind => self.session.rewind(),
            Command::Record => self.session.toggle_record(),
            Command::LoadLatest => self.session.load_latest_take(),
            Command::Load(path) => {
                self.session.load_source_file(&path);
            }
            Command::SelectOutput(id) => {
                self.session.select_output(&id);
            }
            Command::BindInput(port) => {
                self.session.bind_input(port.as_deref());
            }
            Command::Thru(enabled) => self.session.set_midi_thru(enabled),
            Command::Export(path) => {
                let path = path.unwrap_or_else(default_export_path);
                self.session.export_recording(&path);
            }
            Command::Quit => {}
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    // Brings the session to Idle. A recording needs the service's reply
    // first, and a start still in flight may turn into a recording that
    // then has to be stopped as well.
    fn shut_down(&mut self) {
        let deadline = Instant::now() + self.shutdown_grace;
        let mut stop_attempts = 0;

        while Instant::now() < deadline {
            if !self.session.is_busy() {
                if self.session.state() == SessionState::Idle {
                    return;
                }
                if stop_attempts == SHUTDOWN_STOP_ATTEMPTS {
                    break;
                }
                stop_attempts += 1;
                self.session.stop();
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.service_events.recv_timeout(remaining) {
                Ok(event) => {
                    self.session.handle_service_event(event);
                    self.refresh();
                }
                Err(_) => break,
            }
        }
        warn!(
            "Shutting down while the session is still {}",
            self.session.state()
        );
    }

    fn refresh(&mut self) {
        for notification in self.session.take_notifications() {
            self.status.notify(&notification);
        }
        self.status.update(&self.session);
    }
}
