mod common;

use common::{Rig, KEYS};
use synthwave::ui::{format_position, status_message};

#[test]
fn test_status_message_idle() {
    let rig = Rig::new();
    let message = status_message(&rig.session);
    assert!(message.starts_with("Idle"));
    assert!(message.contains("00:00:00.000"));
    assert!(message.contains("in: none"));
    assert!(message.contains("out: loopMIDI Port"));
}

#[test]
fn test_status_message_tracks_session() {
    let mut rig = Rig::new();
    rig.session.bind_input(Some(KEYS));
    rig.session.toggle_record();
    rig.settle();
    rig.clock.set_secs(61.25);
    rig.play_bytes(KEYS, &[0x90, 60, 100]);

    let message = status_message(&rig.session);
    assert!(message.starts_with("Recording"));
    assert!(message.contains("00:01:01.250"));
    assert!(message.contains("active: 1"));
    assert!(message.contains("recorded: 1"));
    assert!(message.contains("last: C4 0.00s"));
    assert!(message.contains("in: Keys"));
}

#[test]
fn test_format_position_hours() {
    assert_eq!(format_position(7384.5), "02:03:04.500");
}
