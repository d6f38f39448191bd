use super::recording::RecordingBuffer;
use super::{note_name, velocity_from_u7, MidiMessage};
use crate::error::{Result, SyncError};
use crossbeam::channel::Sender;
use log::{debug, info, trace, warn};
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::collections::BTreeMap;

/// A note that started sounding on the input device, timestamped on the
/// transport timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub name: String,
    pub velocity: f32,
    pub start_time: f64,
}

/// Bytes pushed from a hardware callback, tagged with the subscription
/// generation that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInput {
    pub generation: u64,
    pub bytes: Vec<u8>,
}

/// Notes currently held on the input device, keyed by pitch.
#[derive(Debug, Default)]
pub struct ActiveNotes {
    notes: BTreeMap<u8, NoteEvent>,
}

impl ActiveNotes {
    pub fn insert(&mut self, note: NoteEvent) {
        self.notes.insert(note.pitch, note);
    }

    pub fn remove(&mut self, pitch: u8) -> Option<NoteEvent> {
        self.notes.remove(&pitch)
    }

    pub fn get(&self, pitch: u8) -> Option<&NoteEvent> {
        self.notes.get(&pitch)
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.notes.contains_key(&pitch)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteEvent> {
        self.notes.values()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    fn drain(&mut self) -> Vec<NoteEvent> {
        std::mem::take(&mut self.notes).into_values().collect()
    }
}

/// What a handled input message changed.
#[derive(Debug, Clone, PartialEq)]
pub enum InputChange {
    NoteOn(NoteEvent),
    NoteOff { pitch: u8 },
}

/// A live hardware subscription. Dropping it tears the subscription down.
pub trait InputSubscription {
    fn port_name(&self) -> &str;
}

/// Enumerable hardware input ports.
pub trait InputPorts {
    fn port_names(&self) -> Vec<String>;

    fn subscribe(
        &self,
        port_name: &str,
        generation: u64,
        tx: Sender<RawInput>,
    ) -> Result<Box<dyn InputSubscription>>;
}

/// Turns hardware input into note events, keeps the active notes set and
/// feeds the recording buffer.
pub struct MidiInputListener {
    active: ActiveNotes,
    subscription: Option<Box<dyn InputSubscription>>,
    generation: u64,
}

impl Default for MidiInputListener {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiInputListener {
    pub fn new() -> Self {
        MidiInputListener {
            active: ActiveNotes::default(),
            subscription: None,
            generation: 0,
        }
    }

    /// Subscribes to `port_name`. A missing or failing port leaves the
    /// listener unbound; this never fails.
    pub fn bind(
        &mut self,
        ports: &dyn InputPorts,
        port_name: Option<&str>,
        tx: &Sender<RawInput>,
    ) -> bool {
        self.generation += 1;

        let Some(name) = port_name else {
            info!("No MIDI input port configured, input disabled");
            return false;
        };

        let available = ports.port_names();
        if !available.iter().any(|p| p == name) {
            warn!(
                "MIDI input port '{}' not found (available: {:?}), running without input",
                name, available
            );
            return false;
        }

        match ports.subscribe(name, self.generation, tx.clone()) {
            Ok(subscription) => {
                info!("Listening on MIDI input port: {}", subscription.port_name());
                self.subscription = Some(subscription);
                true
            }
            Err(e) => {
                warn!("Could not open MIDI input '{}': {}, running without input", name, e);
                false
            }
        }
    }

    /// Tears down the current subscription and returns the notes that were
    /// still held on it. Messages already queued from the old port are
    /// discarded from here on.
    pub fn unbind(&mut self) -> Vec<NoteEvent> {
        if let Some(old) = self.subscription.take() {
            info!("Closing MIDI input port: {}", old.port_name());
        }
        self.generation += 1;
        self.active.drain()
    }

    pub fn bound_port(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.port_name())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_notes(&self) -> &ActiveNotes {
        &self.active
    }

    pub fn handle_raw(
        &mut self,
        raw: &RawInput,
        position: f64,
        buffer: &mut RecordingBuffer,
    ) -> Option<InputChange> {
        if raw.generation != self.generation {
            trace!(
                "Discarding input from stale subscription {} (current {})",
                raw.generation,
                self.generation
            );
            return None;
        }
        let message = MidiMessage::parse(&raw.bytes)?;
        self.handle_message(&message, position, buffer)
    }

    /// Applies one message at transport `position`.
    pub fn handle_message(
        &mut self,
        message: &MidiMessage,
        position: f64,
        buffer: &mut RecordingBuffer,
    ) -> Option<InputChange> {
        match *message {
            MidiMessage::NoteOn { note, velocity, .. } if velocity > 0 => {
                let event = NoteEvent {
                    pitch: note,
                    name: note_name(note),
                    velocity: velocity_from_u7(velocity),
                    start_time: position,
                };
                debug!("Note on {} vel {} at {:.3}s", event.name, velocity, position);
                self.active.insert(event.clone());
                buffer.note_on(event.clone());
                Some(InputChange::NoteOn(event))
            }
            MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note, .. } => {
                debug!("Note off {} at {:.3}s", note_name(note), position);
                self.active.remove(note);
                buffer.note_off(note, position);
                Some(InputChange::NoteOff { pitch: note })
            }
            _ => None,
        }
    }
}

/// Hardware input ports reached through midir.
pub struct MidirInputPorts {
    client_name: String,
}

impl MidirInputPorts {
    pub fn new(client_name: &str) -> Self {
        MidirInputPorts {
            client_name: client_name.to_string(),
        }
    }
}

impl Default for MidirInputPorts {
    fn default() -> Self {
        Self::new("synthwave-input")
    }
}

impl InputPorts for MidirInputPorts {
    fn port_names(&self) -> Vec<String> {
        match MidiInput::new(&format!("{}-list", self.client_name)) {
            Ok(midi_in) => midi_in
                .ports()
                .iter()
                .filter_map(|p| midi_in.port_name(p).ok())
                .collect(),
            Err(e) => {
                warn!("MIDI input unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn subscribe(
        &self,
        port_name: &str,
        generation: u64,
        tx: Sender<RawInput>,
    ) -> Result<Box<dyn InputSubscription>> {
        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| midi_in.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .cloned()
            .ok_or_else(|| SyncError::DeviceUnavailable(port_name.to_string()))?;

        let connection = midi_in.connect(
            &port,
            "synthwave-input-conn",
            move |_stamp, message, _| {
                let _ = tx.send(RawInput {
                    generation,
                    bytes: message.to_vec(),
                });
            },
            (),
        )?;

        Ok(Box::new(MidirSubscription {
            connection: Some(connection),
            port_name: port_name.to_string(),
        }))
    }
}

struct MidirSubscription {
    connection: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl InputSubscription for MidirSubscription {
    fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for MidirSubscription {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            debug!("MIDI input connection to {} closed", self.port_name);
        }
    }
}
