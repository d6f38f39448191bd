//! MIDI functionality for the synchronization core
//!
//! This module provides the MIDI plumbing around the transport:
//! - Wire message parsing and encoding
//! - Live input listening and the active notes set
//! - The recording buffer for captured notes
//! - The output dispatcher and device registry
//! - MIDI source parsing and export
//!
//! Real devices are reached through midir; the traits in [`input`] and
//! [`output`] keep hardware out of the way for tests.

pub mod input;
pub mod output;
pub mod recording;
pub mod source;

pub use input::{ActiveNotes, InputPorts, MidiInputListener, MidirInputPorts, NoteEvent, RawInput};
pub use output::{
    preferred_device, DeviceId, MidiOutputDevice, MidiOutputDispatcher, MidirOutputBackend,
    NoteSink, OutputBackend, OutputPort,
};
pub use recording::{RecordedNote, RecordingBuffer};
pub use source::{MidiSource, SourceNote, SourceTrack};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Controller number for All Notes Off
pub const ALL_NOTES_OFF: u8 = 123;

/// Represents a MIDI message that can be sent or received.
/// Channels are 0-based on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange { channel: u8, program: u8 },
    Clock,
    Start,
    Stop,
    Continue,
}

impl MidiMessage {
    pub fn parse(data: &[u8]) -> Option<MidiMessage> {
        let status = *data.first()?;

        match status & 0xF0 {
            0x90 if data.len() >= 3 => Some(MidiMessage::NoteOn {
                channel: status & 0x0F,
                note: data[1] & 0x7F,
                velocity: data[2] & 0x7F,
            }),
            0x80 if data.len() >= 3 => Some(MidiMessage::NoteOff {
                channel: status & 0x0F,
                note: data[1] & 0x7F,
                velocity: data[2] & 0x7F,
            }),
            0xB0 if data.len() >= 3 => Some(MidiMessage::ControlChange {
                channel: status & 0x0F,
                controller: data[1],
                value: data[2],
            }),
            0xC0 if data.len() >= 2 => Some(MidiMessage::ProgramChange {
                channel: status & 0x0F,
                program: data[1],
            }),
            0xF0 => match status {
                0xF8 => Some(MidiMessage::Clock),
                0xFA => Some(MidiMessage::Start),
                0xFB => Some(MidiMessage::Continue),
                0xFC => Some(MidiMessage::Stop),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), *note, *velocity],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), *note, *velocity],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), *controller, *value],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), *program]
            }
            MidiMessage::Clock => vec![0xF8],
            MidiMessage::Start => vec![0xFA],
            MidiMessage::Stop => vec![0xFC],
            MidiMessage::Continue => vec![0xFB],
        }
    }
}

/// Scientific pitch name, `C4` being pitch 60.
pub fn note_name(pitch: u8) -> String {
    let octave = i32::from(pitch) / 12 - 1;
    format!("{}{}", NOTE_NAMES[usize::from(pitch % 12)], octave)
}

/// Converts a normalised velocity to a 7-bit value. Zero would read as a
/// note-off on most devices, so the floor is 1.
pub fn velocity_to_u7(velocity: f32) -> u8 {
    let v = if velocity.is_finite() { velocity } else { 0.0 };
    ((v.clamp(0.0, 1.0) * 127.0).round() as u8).max(1)
}

pub fn velocity_from_u7(velocity: u8) -> f32 {
    f32::from(velocity.min(127)) / 127.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(67), "G4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn test_parse_channel_messages() {
        assert_eq!(
            MidiMessage::parse(&[0x91, 60, 100]),
            Some(MidiMessage::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiMessage::parse(&[0x80, 60, 0]),
            Some(MidiMessage::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0
            })
        );
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
    }

    #[test]
    fn test_parse_system_messages() {
        assert_eq!(MidiMessage::parse(&[0xF8]), Some(MidiMessage::Clock));
        assert_eq!(MidiMessage::parse(&[0xFA]), Some(MidiMessage::Start));
        assert_eq!(MidiMessage::parse(&[0xFC]), Some(MidiMessage::Stop));
        assert_eq!(MidiMessage::parse(&[0xFB]), Some(MidiMessage::Continue));
        assert_eq!(MidiMessage::parse(&[0xFE]), None);
    }

    #[test]
    fn test_encode_all_notes_off() {
        let msg = MidiMessage::ControlChange {
            channel: 2,
            controller: ALL_NOTES_OFF,
            value: 0,
        };
        assert_eq!(msg.to_bytes(), vec![0xB2, 123, 0]);
    }

    #[test]
    fn test_velocity_conversion() {
        assert_eq!(velocity_to_u7(1.0), 127);
        assert_eq!(velocity_to_u7(0.0), 1);
        assert_eq!(velocity_to_u7(2.0), 127);
        assert_eq!(velocity_to_u7(f32::NAN), 1);
        assert!((velocity_from_u7(127) - 1.0).abs() < f32::EPSILON);
    }
}
