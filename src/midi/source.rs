//! MIDI sources.
//!
//! A source is a list of tracks of timed notes, in seconds. Sources arrive
//! either as Standard MIDI Files or as the JSON event list the recording
//! service hands out, and recorded takes can be written back to both.
//!
//! SMF import honours the tempo map and SMPTE timing. Note-offs close the
//! oldest open note on the same channel and pitch; notes still open at the
//! end of a track end there.

use super::recording::RecordedNote;
use super::{note_name, velocity_from_u7, velocity_to_u7};
use crate::error::{Result, SyncError};
use log::{debug, info};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

/// Resolution of exported files
pub const EXPORT_PPQ: u16 = 960;
/// Tempo of exported files, 120 BPM
pub const EXPORT_USEC_PER_BEAT: u32 = 500_000;
const DEFAULT_USEC_PER_BEAT: f64 = 500_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNote {
    #[serde(rename = "midi")]
    pub pitch: u8,
    pub name: String,
    pub time: f64,
    pub duration: f64,
    pub velocity: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceTrack {
    #[serde(default)]
    pub name: Option<String>,
    pub notes: Vec<SourceNote>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MidiSource {
    pub tracks: Vec<SourceTrack>,
}

impl MidiSource {
    /// Parses a Standard MIDI File or a JSON event list.
    pub fn parse(bytes: &[u8]) -> Result<MidiSource> {
        if bytes.starts_with(b"MThd") {
            Self::from_smf(bytes)
        } else if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
            Self::from_json(bytes)
        } else {
            Err(SyncError::MalformedSource(
                "neither a Standard MIDI File nor a JSON event list".to_string(),
            ))
        }
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<MidiSource> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        info!("Loading MIDI source from {}", path.display());
        Self::parse(&data)
    }

    pub fn from_json(bytes: &[u8]) -> Result<MidiSource> {
        let source: MidiSource = serde_json::from_slice(bytes)?;
        for note in source.tracks.iter().flat_map(|t| &t.notes) {
            if note.pitch > 127 || !note.time.is_finite() || !note.duration.is_finite() {
                return Err(SyncError::MalformedSource(format!(
                    "invalid note {} at {}",
                    note.pitch, note.time
                )));
            }
        }
        Ok(source)
    }

    pub fn from_smf(bytes: &[u8]) -> Result<MidiSource> {
        let smf = Smf::parse(bytes)?;
        let time_base = TimeBase::new(&smf);

        let tracks: Vec<SourceTrack> = smf
            .tracks
            .iter()
            .map(|events| parse_track(events, &time_base))
            .collect();
        debug!(
            "Parsed SMF: {} tracks, {} notes",
            tracks.len(),
            tracks.iter().map(|t| t.notes.len()).sum::<usize>()
        );
        Ok(MidiSource { tracks })
    }

    /// A single-track source holding the finished notes of a take.
    pub fn from_recorded(notes: &[RecordedNote]) -> MidiSource {
        let notes = notes
            .iter()
            .filter(|n| n.finished)
            .map(|n| SourceNote {
                pitch: n.note.pitch,
                name: n.note.name.clone(),
                time: n.note.start_time,
                duration: n.duration.unwrap_or(0.0),
                velocity: n.note.velocity,
            })
            .collect();
        MidiSource {
            tracks: vec![SourceTrack {
                name: Some("Recording".to_string()),
                notes,
            }],
        }
    }

    /// The track the core plays: track 0, unless it holds no notes (a tempo
    /// track), in which case the first track that does.
    pub fn primary_track(&self) -> Option<&SourceTrack> {
        match self.tracks.first() {
            Some(first) if first.notes.is_empty() => self
                .tracks
                .iter()
                .find(|t| !t.notes.is_empty())
                .or(Some(first)),
            first => first,
        }
    }

    /// End of the last note, in seconds.
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| &t.notes)
            .map(|n| n.time + n.duration)
            .fold(0.0, f64::max)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the primary track as a format 0 file at 120 BPM. Times are
    /// quantised to the export resolution.
    pub fn to_smf(&self) -> Result<Vec<u8>> {
        let ticks_per_second =
            f64::from(EXPORT_PPQ) * 1_000_000.0 / f64::from(EXPORT_USEC_PER_BEAT);
        let to_tick = |secs: f64| (secs.max(0.0) * ticks_per_second).round() as u64;

        // (tick, rank, pitch, velocity). At one tick, offs of earlier notes
        // come first, then ons, then offs of notes that start on that tick.
        let mut timed: Vec<(u64, u8, u8, u8)> = Vec::new();
        if let Some(track) = self.primary_track() {
            for note in &track.notes {
                let start = to_tick(note.time);
                let end = to_tick(note.time + note.duration).max(start);
                let pitch = note.pitch & 0x7F;
                timed.push((start, 1, pitch, velocity_to_u7(note.velocity)));
                timed.push((end, if end > start { 0 } else { 2 }, pitch, 0));
            }
        }
        timed.sort_by_key(|&(tick, rank, pitch, _)| (tick, rank, pitch));

        let mut events: Vec<TrackEvent> = vec![TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(EXPORT_USEC_PER_BEAT))),
        }];
        let mut last_tick = 0u64;
        for (tick, rank, pitch, velocity) in timed {
            let delta = (tick - last_tick).min(0x0FFF_FFFF) as u32;
            last_tick = tick;
            let message = if rank == 1 {
                midly::MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(velocity),
                }
            } else {
                midly::MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                }
            };
            events.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message,
                },
            });
        }
        events.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(EXPORT_PPQ)),
        ));
        smf.tracks.push(events);

        let mut out = Vec::new();
        smf.write_std(&mut out)?;
        Ok(out)
    }
}

/// Converts absolute ticks to seconds.
enum TimeBase {
    Metrical {
        ppq: f64,
        // (tick, seconds at tick, microseconds per beat from tick on)
        segments: Vec<(u64, f64, f64)>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TimeBase {
    fn new(smf: &Smf) -> Self {
        match smf.header.timing {
            Timing::Timecode(fps, subframes) => TimeBase::Timecode {
                ticks_per_second: (f64::from(fps.as_f32()) * f64::from(subframes)).max(1.0),
            },
            Timing::Metrical(ppq) => {
                let mut changes: Vec<(u64, f64)> = Vec::new();
                for track in &smf.tracks {
                    let mut tick = 0u64;
                    for event in track {
                        tick += u64::from(event.delta.as_int());
                        if let TrackEventKind::Meta(MetaMessage::Tempo(usec)) = event.kind {
                            changes.push((tick, f64::from(usec.as_int())));
                        }
                    }
                }
                changes.sort_by_key(|&(tick, _)| tick);

                let ppq = f64::from(ppq.as_int().max(1));
                let mut segments = vec![(0u64, 0.0f64, DEFAULT_USEC_PER_BEAT)];
                for (tick, usec) in changes {
                    let (seg_tick, seg_secs, seg_usec) = segments[segments.len() - 1];
                    let secs = seg_secs + (tick - seg_tick) as f64 * seg_usec / ppq / 1_000_000.0;
                    if tick == seg_tick {
                        segments.pop();
                    }
                    segments.push((tick, secs, usec));
                }
                TimeBase::Metrical { ppq, segments }
            }
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            TimeBase::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
            TimeBase::Metrical { ppq, segments } => {
                let (seg_tick, seg_secs, usec) = segments
                    .iter()
                    .rev()
                    .find(|(t, _, _)| *t <= tick)
                    .copied()
                    .unwrap_or((0, 0.0, DEFAULT_USEC_PER_BEAT));
                seg_secs + (tick - seg_tick) as f64 * usec / ppq / 1_000_000.0
            }
        }
    }
}

fn parse_track(events: &[TrackEvent], time_base: &TimeBase) -> SourceTrack {
    let mut open: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
    let mut notes = Vec::new();
    let mut name = None;
    let mut tick = 0u64;

    let close = |pitch: u8, start: u64, end: u64, velocity: u8, notes: &mut Vec<SourceNote>| {
        let time = time_base.seconds(start);
        notes.push(SourceNote {
            pitch,
            name: note_name(pitch),
            time,
            duration: (time_base.seconds(end) - time).max(0.0),
            velocity: velocity_from_u7(velocity),
        });
    };

    for event in events {
        tick += u64::from(event.delta.as_int());
        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                name = std::str::from_utf8(bytes).ok().map(str::to_string);
            }
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();
                match message {
                    midly::MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((ch, key.as_int()))
                            .or_default()
                            .push_back((tick, vel.as_int()));
                    }
                    midly::MidiMessage::NoteOn { key, .. } | midly::MidiMessage::NoteOff { key, .. } => {
                        let pitch = key.as_int();
                        if let Some((start, velocity)) =
                            open.get_mut(&(ch, pitch)).and_then(VecDeque::pop_front)
                        {
                            close(pitch, start, tick, velocity, &mut notes);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    for ((_, pitch), pending) in open {
        for (start, velocity) in pending {
            close(pitch, start, tick, velocity, &mut notes);
        }
    }

    notes.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.pitch.cmp(&b.pitch)));
    SourceTrack { name, notes }
}
