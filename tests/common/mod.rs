#![allow(dead_code)]

pub mod mock;

use mock::{ManualSpawner, MockInputPorts, MockOutputBackend, MockRecordingService};
use synthwave::clock::ManualClock;
use synthwave::service::DeviceSelections;
use std::time::Duration;
use synthwave::{Session, SessionOptions, TaskSpawner, ThreadSpawner};

pub const OUTPUT: &str = "loopMIDI Port";
pub const KEYS: &str = "Keys";
pub const PADS: &str = "Pads";

/// A session wired to mocks, with handles kept for scripting and inspection.
///
/// Service requests are queued on `spawner` and only answered by
/// [`Rig::settle`], so a test can act while a request is in flight.
pub struct Rig {
    pub clock: ManualClock,
    pub outputs: MockOutputBackend,
    pub inputs: MockInputPorts,
    pub service: MockRecordingService,
    pub spawner: ManualSpawner,
    pub session: Session,
}

impl Rig {
    pub fn new() -> Self {
        let spawner = ManualSpawner::new();
        Self::with_spawner(spawner.clone(), Box::new(spawner))
    }

    /// Service requests run on real threads; replies arrive on the
    /// session's service channel.
    pub fn threaded() -> Self {
        Self::with_spawner(ManualSpawner::new(), Box::new(ThreadSpawner::new()))
    }

    fn with_spawner(spawner: ManualSpawner, tasks: Box<dyn TaskSpawner>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let clock = ManualClock::new();
        let outputs = MockOutputBackend::new(&["Microsoft GS Wavetable Synth", OUTPUT]);
        let inputs = MockInputPorts::new(&[KEYS, PADS]);
        let service = MockRecordingService::new();
        let options = SessionOptions {
            selections: DeviceSelections {
                video_device_index: 2,
                audio_device_index: None,
                midi_port_name: Some(KEYS.to_string()),
            },
            ..SessionOptions::default()
        };

        let mut session = Session::new(
            Box::new(clock.clone()),
            Box::new(outputs.clone()),
            Box::new(inputs.clone()),
            Box::new(service.clone()),
            tasks,
            options,
        );
        session.select_preferred_output();
        session.take_notifications();

        Rig {
            clock,
            outputs,
            inputs,
            service,
            spawner,
            session,
        }
    }

    /// Answers every queued service request, and any it leads to, then
    /// applies the replies.
    pub fn settle(&mut self) {
        while self.spawner.run_pending() > 0 {
            self.session.pump_service();
        }
    }

    /// Waits for one reply from a threaded service and applies it.
    pub fn await_service(&mut self) {
        let event = self
            .session
            .service_receiver()
            .recv_timeout(Duration::from_secs(5))
            .expect("recording service did not answer");
        self.session.handle_service_event(event);
    }

    /// Advances time then runs one frame.
    pub fn frame_at(&mut self, seconds: f64) {
        self.clock.set_secs(seconds);
        self.session.tick();
    }

    pub fn play_bytes(&mut self, port: &str, bytes: &[u8]) {
        assert!(self.inputs.play(port, bytes), "{} is not subscribed", port);
        self.session.pump_input();
    }
}

pub fn json_source(notes: &[(u8, f64, f64)]) -> Vec<u8> {
    let notes: Vec<String> = notes
        .iter()
        .map(|(pitch, time, duration)| {
            format!(
                r#"{{"midi":{},"name":"{}","time":{},"duration":{},"velocity":0.8}}"#,
                pitch,
                synthwave::midi::note_name(*pitch),
                time,
                duration
            )
        })
        .collect();
    format!(r#"{{"tracks":[{{"name":"Piano","notes":[{}]}}]}}"#, notes.join(",")).into_bytes()
}
