use super::{velocity_to_u7, MidiMessage, ALL_NOTES_OFF};
use crate::error::{Result, SyncError};
use log::{debug, error, info, trace, warn};
use midir::{MidiOutput, MidiOutputConnection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Channel used when callers don't name one (1-16, as on the device panel)
pub const DEFAULT_CHANNEL: u8 = 1;

const PREFERRED_OUTPUTS: [&str; 2] = ["loopMIDI", "IAC"];

/// Stable identifier of an output device, persisted in settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: &str) -> Self {
        DeviceId(id.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiOutputDevice {
    pub id: DeviceId,
    pub name: String,
}

/// An open connection to an output device.
pub trait OutputPort {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Registry of output devices that can be enumerated and opened by id.
pub trait OutputBackend {
    fn devices(&self) -> Vec<MidiOutputDevice>;
    fn open(&self, id: &DeviceId) -> Result<Box<dyn OutputPort>>;
}

/// Anything that can play notes. Velocity is normalised to [0, 1].
pub trait NoteSink {
    fn note_on(&mut self, pitch: u8, velocity: f32);
    fn note_off(&mut self, pitch: u8);
}

/// Picks the device to use when none is configured: a loopback bridge if
/// one exists, else the first device.
pub fn preferred_device(devices: &[MidiOutputDevice]) -> Option<&MidiOutputDevice> {
    devices
        .iter()
        .find(|d| PREFERRED_OUTPUTS.iter().any(|p| d.name.contains(p)))
        .or_else(|| devices.first())
}

struct SelectedOutput {
    device: MidiOutputDevice,
    port: Box<dyn OutputPort>,
}

/// Owns the selected output device and delivers scheduled and live notes
/// to it. Every call goes to whatever is selected at that moment.
pub struct MidiOutputDispatcher {
    backend: Box<dyn OutputBackend>,
    selected: Option<SelectedOutput>,
    // (channel, pitch) pairs sent a note-on and not yet released
    sounding: BTreeSet<(u8, u8)>,
}

impl MidiOutputDispatcher {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        MidiOutputDispatcher {
            backend,
            selected: None,
            sounding: BTreeSet::new(),
        }
    }

    pub fn devices(&self) -> Vec<MidiOutputDevice> {
        self.backend.devices()
    }

    /// Resolves `id` and opens it. Notes sounding on the previous device are
    /// released first. On failure the previous selection stays in place.
    pub fn select(&mut self, id: &DeviceId) -> Result<()> {
        let device = self
            .backend
            .devices()
            .into_iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| SyncError::DeviceUnavailable(id.to_string()))?;
        let port = self.backend.open(id)?;

        self.release_sounding();
        info!("MIDI output: {}", device.name);
        self.selected = Some(SelectedOutput { device, port });
        Ok(())
    }

    /// Selects [`preferred_device`] if nothing is selected yet.
    pub fn select_preferred(&mut self) -> Option<DeviceId> {
        if let Some(selected) = &self.selected {
            return Some(selected.device.id.clone());
        }
        let devices = self.backend.devices();
        let id = preferred_device(&devices)?.id.clone();
        match self.select(&id) {
            Ok(()) => Some(id),
            Err(e) => {
                warn!("Could not open preferred MIDI output {}: {}", id, e);
                None
            }
        }
    }

    pub fn selected(&self) -> Option<&MidiOutputDevice> {
        self.selected.as_ref().map(|s| &s.device)
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding.len()
    }

    pub fn send_note_on(&mut self, pitch: u8, velocity: f32) {
        self.send_note_on_channel(pitch, velocity, DEFAULT_CHANNEL);
    }

    pub fn send_note_off(&mut self, pitch: u8) {
        self.send_note_off_channel(pitch, DEFAULT_CHANNEL);
    }

    pub fn send_note_on_channel(&mut self, pitch: u8, velocity: f32, channel: u8) {
        let channel = channel.clamp(1, 16);
        let message = MidiMessage::NoteOn {
            channel: channel - 1,
            note: pitch & 0x7F,
            velocity: velocity_to_u7(velocity),
        };
        if self.transmit(&message) {
            self.sounding.insert((channel, pitch & 0x7F));
        }
    }

    pub fn send_note_off_channel(&mut self, pitch: u8, channel: u8) {
        let channel = channel.clamp(1, 16);
        let message = MidiMessage::NoteOff {
            channel: channel - 1,
            note: pitch & 0x7F,
            velocity: 0,
        };
        if self.transmit(&message) {
            self.sounding.remove(&(channel, pitch & 0x7F));
        }
    }

    /// Releases every note this dispatcher has sounding, then sends All
    /// Notes Off on each channel involved (and the default channel).
    pub fn all_notes_off(&mut self) {
        let mut channels: BTreeSet<u8> = self.sounding.iter().map(|(c, _)| *c).collect();
        channels.insert(DEFAULT_CHANNEL);
        self.release_sounding();
        for channel in channels {
            self.transmit(&MidiMessage::ControlChange {
                channel: channel - 1,
                controller: ALL_NOTES_OFF,
                value: 0,
            });
        }
    }

    fn release_sounding(&mut self) {
        let sounding = std::mem::take(&mut self.sounding);
        if !sounding.is_empty() {
            debug!("Releasing {} sounding notes", sounding.len());
        }
        for (channel, pitch) in sounding {
            self.transmit(&MidiMessage::NoteOff {
                channel: channel - 1,
                note: pitch,
                velocity: 0,
            });
        }
    }

    // Returns whether a device was selected to receive the message.
    fn transmit(&mut self, message: &MidiMessage) -> bool {
        let Some(selected) = self.selected.as_mut() else {
            trace!("No MIDI output selected, dropping {:?}", message);
            return false;
        };
        if let Err(e) = selected.port.send(&message.to_bytes()) {
            error!("Failed to send MIDI message to {}: {}", selected.device.name, e);
        }
        true
    }
}

impl NoteSink for MidiOutputDispatcher {
    fn note_on(&mut self, pitch: u8, velocity: f32) {
        self.send_note_on(pitch, velocity);
    }

    fn note_off(&mut self, pitch: u8) {
        self.send_note_off(pitch);
    }
}

/// Output devices reached through midir; ids are port names.
pub struct MidirOutputBackend {
    client_name: String,
}

impl MidirOutputBackend {
    pub fn new(client_name: &str) -> Self {
        MidirOutputBackend {
            client_name: client_name.to_string(),
        }
    }
}

impl Default for MidirOutputBackend {
    fn default() -> Self {
        Self::new("synthwave-output")
    }
}

impl OutputBackend for MidirOutputBackend {
    fn devices(&self) -> Vec<MidiOutputDevice> {
        match MidiOutput::new(&format!("{}-list", self.client_name)) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .map(|name| MidiOutputDevice {
                    id: DeviceId(name.clone()),
                    name,
                })
                .collect(),
            Err(e) => {
                warn!("MIDI output unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn open(&self, id: &DeviceId) -> Result<Box<dyn OutputPort>> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| midi_out.port_name(p).map(|n| n == id.0).unwrap_or(false))
            .cloned()
            .ok_or_else(|| SyncError::DeviceUnavailable(id.to_string()))?;

        info!("Connecting to MIDI output port: {}", id);
        let connection = midi_out.connect(&port, "synthwave-output-conn")?;
        Ok(Box::new(MidirOutputPort { connection }))
    }
}

struct MidirOutputPort {
    connection: MidiOutputConnection,
}

impl OutputPort for MidirOutputPort {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection.send(bytes)?;
        Ok(())
    }
}
