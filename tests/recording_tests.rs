mod common;

use crossbeam::channel::unbounded;
use synthwave::midi::{MidiInputListener, RecordingBuffer};
use common::mock::MockInputPorts;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_feeds_buffer_from_bound_port() {
        let ports = MockInputPorts::new(&["Keys"]);
        let (tx, rx) = unbounded();
        let mut listener = MidiInputListener::new();
        let mut buffer = RecordingBuffer::new();
        buffer.set_recording(true);

        assert!(listener.bind(&ports, Some("Keys"), &tx));
        assert_eq!(listener.bound_port(), Some("Keys"));

        ports.play("Keys", &[0x90, 67, 100]);
        let raw = rx.try_recv().unwrap();
        listener.handle_raw(&raw, 1.0, &mut buffer);

        ports.play("Keys", &[0x80, 67, 0]);
        let raw = rx.try_recv().unwrap();
        listener.handle_raw(&raw, 1.4, &mut buffer);

        let notes = buffer.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note.pitch, 67);
        assert_eq!(notes[0].note.start_time, 1.0);
        assert!(notes[0].finished);
        assert!((notes[0].duration.unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_unmatched_note_off_is_ignored() {
        let mut buffer = RecordingBuffer::new();
        buffer.set_recording(true);
        assert!(!buffer.note_off(60, 1.0));
        assert!(buffer.notes().is_empty());
    }

    #[test]
    fn test_unknown_port_leaves_listener_unbound() {
        let ports = MockInputPorts::new(&["Keys"]);
        let (tx, _rx) = unbounded();
        let mut listener = MidiInputListener::new();

        assert!(!listener.bind(&ports, Some("Drums"), &tx));
        assert_eq!(listener.bound_port(), None);
        assert!(!listener.bind(&ports, None, &tx));
    }

    #[test]
    fn test_unbind_returns_held_notes() {
        let ports = MockInputPorts::new(&["Keys"]);
        let (tx, rx) = unbounded();
        let mut listener = MidiInputListener::new();
        let mut buffer = RecordingBuffer::new();
        listener.bind(&ports, Some("Keys"), &tx);

        ports.play("Keys", &[0x90, 60, 100]);
        ports.play("Keys", &[0x91, 64, 100]);
        for raw in rx.try_iter() {
            listener.handle_raw(&raw, 0.0, &mut buffer);
        }
        assert_eq!(listener.active_notes().len(), 2);

        let released: Vec<u8> = listener.unbind().iter().map(|n| n.pitch).collect();
        assert_eq!(released, vec![60, 64]);
        assert!(listener.active_notes().is_empty());
        assert!(!ports.is_subscribed("Keys"));
    }

    #[test]
    fn test_repeated_note_on_replaces_active_entry() {
        let ports = MockInputPorts::new(&["Keys"]);
        let (tx, rx) = unbounded();
        let mut listener = MidiInputListener::new();
        let mut buffer = RecordingBuffer::new();
        buffer.set_recording(true);
        listener.bind(&ports, Some("Keys"), &tx);

        ports.play("Keys", &[0x90, 60, 100]);
        ports.play("Keys", &[0x90, 60, 50]);
        let raws: Vec<_> = rx.try_iter().collect();
        listener.handle_raw(&raws[0], 0.0, &mut buffer);
        listener.handle_raw(&raws[1], 0.5, &mut buffer);

        assert_eq!(listener.active_notes().len(), 1);
        assert_eq!(listener.active_notes().get(60).unwrap().start_time, 0.5);
        assert_eq!(buffer.open_count(), 2);
    }
}
