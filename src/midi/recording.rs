use super::input::NoteEvent;
use log::{debug, info, trace};

/// A note captured during a recording session. The duration is known once
/// the matching note-off arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNote {
    pub note: NoteEvent,
    pub duration: Option<f64>,
    pub finished: bool,
}

impl RecordedNote {
    /// Length to draw at transport position `now`: the real duration once
    /// finished, otherwise the time held so far.
    pub fn display_duration(&self, now: f64) -> f64 {
        match self.duration {
            Some(duration) if self.finished => duration,
            _ => (now - self.note.start_time).max(0.0),
        }
    }
}

/// Captures note-on/off pairs into duration-bearing records while a
/// recording session is active.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    notes: Vec<RecordedNote>,
    recording: bool,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turning recording on clears the previous take; turning it off keeps
    /// the captured notes for downstream consumers.
    pub fn set_recording(&mut self, recording: bool) {
        if recording && !self.recording {
            info!(
                "Recording buffer armed, discarding {} notes from previous take",
                self.notes.len()
            );
            self.notes.clear();
        } else if !recording && self.recording {
            info!("Recording buffer closed with {} notes", self.notes.len());
        }
        self.recording = recording;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn note_on(&mut self, note: NoteEvent) {
        if !self.recording {
            return;
        }
        trace!("Recording note-on {} at {:.3}s", note.name, note.start_time);
        self.notes.push(RecordedNote {
            note,
            duration: None,
            finished: false,
        });
    }

    /// Completes the oldest open note with this pitch. Returns false when
    /// nothing matched; an unmatched note-off leaves the buffer untouched.
    pub fn note_off(&mut self, pitch: u8, time: f64) -> bool {
        if !self.recording {
            return false;
        }
        match self
            .notes
            .iter_mut()
            .find(|n| !n.finished && n.note.pitch == pitch)
        {
            Some(open) => {
                let duration = (time - open.note.start_time).max(0.0);
                open.duration = Some(duration);
                open.finished = true;
                trace!("Recording note-off {} after {:.3}s", open.note.name, duration);
                true
            }
            None => {
                debug!("Dropping note-off for pitch {} with no open note", pitch);
                false
            }
        }
    }

    pub fn notes(&self) -> &[RecordedNote] {
        &self.notes
    }

    pub fn open_count(&self) -> usize {
        self.notes.iter().filter(|n| !n.finished).count()
    }
}
