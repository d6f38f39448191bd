//! MIDI file scheduler
//!
//! Turns the notes of a source into transport-relative cues (a press at the
//! note's start, a release at its end) and delivers every cue whose time the
//! transport has reached. Because cues are compared against the polled
//! transport position, pause and resume never drift.

use crate::midi::{NoteSink, SourceNote};
use log::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub time: f64,
    pub pitch: u8,
    pub duration: f64,
    pub velocity: f32,
}

impl ScheduledEvent {
    pub fn from_note(note: &SourceNote) -> Self {
        ScheduledEvent {
            time: note.time.max(0.0),
            pitch: note.pitch & 0x7F,
            duration: note.duration.max(0.0),
            velocity: note.velocity.clamp(0.0, 1.0),
        }
    }

    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Press,
    Release,
}

#[derive(Debug, Clone, Copy)]
struct Cue {
    time: f64,
    // Order among cues at the same time: releases, presses, then releases
    // of zero-length notes
    rank: u8,
    action: Action,
    event: usize,
}

#[derive(Default)]
pub struct MidiFileScheduler {
    events: Vec<ScheduledEvent>,
    cues: Vec<Cue>,
    next: usize,
    sounding: Vec<bool>,
}

impl MidiFileScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the schedule. The previous one is disposed first, releasing
    /// anything it left sounding. Cues before `position` are treated as
    /// already passed.
    pub fn load(&mut self, notes: &[SourceNote], position: f64, sink: &mut dyn NoteSink) -> usize {
        self.clear(sink);

        self.events = notes
            .iter()
            .filter(|n| n.time.is_finite() && n.duration.is_finite())
            .map(ScheduledEvent::from_note)
            .collect();
        self.sounding = vec![false; self.events.len()];

        self.cues = Vec::with_capacity(self.events.len() * 2);
        for (index, event) in self.events.iter().enumerate() {
            self.cues.push(Cue {
                time: event.time,
                rank: 1,
                action: Action::Press,
                event: index,
            });
            self.cues.push(Cue {
                time: event.end(),
                rank: if event.duration > 0.0 { 0 } else { 2 },
                action: Action::Release,
                event: index,
            });
        }
        self.cues.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.rank.cmp(&b.rank))
                .then(a.event.cmp(&b.event))
        });
        self.next = self.first_cue_at(position);

        info!("Scheduled {} events ({} cues)", self.events.len(), self.cues.len());
        self.events.len()
    }

    /// Disposes the schedule, releasing anything still sounding.
    pub fn clear(&mut self, sink: &mut dyn NoteSink) {
        self.release_all(sink);
        self.events.clear();
        self.cues.clear();
        self.sounding.clear();
        self.next = 0;
    }

    /// Delivers every cue due at or before `position`, in time order.
    pub fn advance(&mut self, position: f64, sink: &mut dyn NoteSink) -> usize {
        let mut fired = 0;
        while let Some(cue) = self.cues.get(self.next).copied() {
            if cue.time > position {
                break;
            }
            self.next += 1;

            let event = self.events[cue.event];
            match cue.action {
                Action::Press => {
                    trace!("Cue note-on {} at {:.3}s", event.pitch, position);
                    sink.note_on(event.pitch, event.velocity);
                    self.sounding[cue.event] = true;
                    fired += 1;
                }
                Action::Release if self.sounding[cue.event] => {
                    trace!("Cue note-off {} at {:.3}s", event.pitch, position);
                    sink.note_off(event.pitch);
                    self.sounding[cue.event] = false;
                    fired += 1;
                }
                Action::Release => {}
            }
        }
        fired
    }

    /// Repositions to `position`, force-releasing every note the schedule
    /// has sounding.
    pub fn seek(&mut self, position: f64, sink: &mut dyn NoteSink) {
        self.release_all(sink);
        self.next = self.first_cue_at(position);
        debug!(
            "Scheduler repositioned to {:.3}s, {} cues pending",
            position,
            self.pending()
        );
    }

    /// Releases sounding notes; nothing is delivered again until the next
    /// [`advance`](Self::advance).
    pub fn stop(&mut self, sink: &mut dyn NoteSink) {
        self.release_all(sink);
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn pending(&self) -> usize {
        self.cues.len() - self.next
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding.iter().filter(|s| **s).count()
    }

    fn release_all(&mut self, sink: &mut dyn NoteSink) {
        for (index, sounding) in self.sounding.iter_mut().enumerate() {
            if *sounding {
                sink.note_off(self.events[index].pitch);
                *sounding = false;
            }
        }
    }

    fn first_cue_at(&self, position: f64) -> usize {
        self.cues.partition_point(|c| c.time < position)
    }
}
