//! In-memory stand-ins for hardware ports, the recording service and the
//! task spawner.
//!
//! Each mock is a cheap handle over shared state: keep a clone in the test,
//! hand another to the component, then script or inspect through the clone.

use crossbeam::channel::Sender;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use synthwave::midi::input::{InputPorts, InputSubscription, RawInput};
use synthwave::midi::output::{DeviceId, MidiOutputDevice, OutputBackend, OutputPort};
use synthwave::midi::MidiMessage;
use synthwave::service::{DeviceSelections, LatestTake, RecordingService};
use synthwave::spawner::{Task, TaskSpawner};
use synthwave::{Result, SyncError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A message delivered to a mock output device.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub device: DeviceId,
    pub message: MidiMessage,
}

#[derive(Clone, Default)]
pub struct MockOutputBackend {
    devices: Arc<Mutex<Vec<MidiOutputDevice>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MockOutputBackend {
    pub fn new(names: &[&str]) -> Self {
        let backend = Self::default();
        for name in names {
            backend.add_device(name);
        }
        backend
    }

    pub fn add_device(&self, name: &str) {
        lock(&self.devices).push(MidiOutputDevice {
            id: DeviceId::new(name),
            name: name.to_string(),
        });
    }

    pub fn remove_device(&self, name: &str) {
        lock(&self.devices).retain(|d| d.name != name);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, name: &str) -> Vec<MidiMessage> {
        lock(&self.sent)
            .iter()
            .filter(|s| s.device.0 == name)
            .map(|s| s.message.clone())
            .collect()
    }

    pub fn clear_sent(&self) {
        lock(&self.sent).clear();
    }
}

impl OutputBackend for MockOutputBackend {
    fn devices(&self) -> Vec<MidiOutputDevice> {
        lock(&self.devices).clone()
    }

    fn open(&self, id: &DeviceId) -> Result<Box<dyn OutputPort>> {
        if !lock(&self.devices).iter().any(|d| &d.id == id) {
            return Err(SyncError::DeviceUnavailable(id.to_string()));
        }
        Ok(Box::new(MockOutputPort {
            device: id.clone(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct MockOutputPort {
    device: DeviceId,
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl OutputPort for MockOutputPort {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let message = MidiMessage::parse(bytes)
            .ok_or_else(|| SyncError::Connection(format!("unparseable bytes {:?}", bytes)))?;
        lock(&self.sent).push(SentMessage {
            device: self.device.clone(),
            message,
        });
        Ok(())
    }
}

struct Subscription {
    port: String,
    generation: u64,
    tx: Sender<RawInput>,
    open: Arc<AtomicBool>,
}

#[derive(Clone, Default)]
pub struct MockInputPorts {
    ports: Arc<Mutex<Vec<String>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl MockInputPorts {
    pub fn new(names: &[&str]) -> Self {
        let ports = Self::default();
        lock(&ports.ports).extend(names.iter().map(|n| n.to_string()));
        ports
    }

    /// Pushes bytes as if played on `port`. Returns false when nothing is
    /// subscribed to it.
    pub fn play(&self, port: &str, bytes: &[u8]) -> bool {
        let subscriptions = lock(&self.subscriptions);
        match subscriptions
            .iter()
            .rev()
            .find(|s| s.port == port && s.open.load(Ordering::SeqCst))
        {
            Some(s) => s
                .tx
                .send(RawInput {
                    generation: s.generation,
                    bytes: bytes.to_vec(),
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self, port: &str) -> bool {
        lock(&self.subscriptions)
            .iter()
            .any(|s| s.port == port && s.open.load(Ordering::SeqCst))
    }
}

impl InputPorts for MockInputPorts {
    fn port_names(&self) -> Vec<String> {
        lock(&self.ports).clone()
    }

    fn subscribe(
        &self,
        port_name: &str,
        generation: u64,
        tx: Sender<RawInput>,
    ) -> Result<Box<dyn InputSubscription>> {
        let open = Arc::new(AtomicBool::new(true));
        lock(&self.subscriptions).push(Subscription {
            port: port_name.to_string(),
            generation,
            tx,
            open: Arc::clone(&open),
        });
        Ok(Box::new(MockSubscription {
            port: port_name.to_string(),
            open,
        }))
    }
}

struct MockSubscription {
    port: String,
    open: Arc<AtomicBool>,
}

impl InputSubscription for MockSubscription {
    fn port_name(&self) -> &str {
        &self.port
    }
}

impl Drop for MockSubscription {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ServiceState {
    fail_start: Option<String>,
    fail_stop: Option<String>,
    stop_delay: Option<Duration>,
    remote_selections: Option<DeviceSelections>,
    latest: LatestTake,
    sources: HashMap<String, Vec<u8>>,
    started_with: Vec<DeviceSelections>,
    stops: usize,
    next_session: u32,
}

/// Scripted recording service.
#[derive(Clone, Default)]
pub struct MockRecordingService {
    state: Arc<Mutex<ServiceState>>,
}

impl MockRecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `start` fail with `message`, or succeed again with `None`.
    pub fn fail_start(&self, message: Option<&str>) {
        lock(&self.state).fail_start = message.map(str::to_string);
    }

    pub fn fail_stop(&self, message: Option<&str>) {
        lock(&self.state).fail_stop = message.map(str::to_string);
    }

    /// Makes `stop` take `delay` before answering.
    pub fn set_stop_delay(&self, delay: Duration) {
        lock(&self.state).stop_delay = Some(delay);
    }

    pub fn set_remote_selections(&self, selections: Option<DeviceSelections>) {
        lock(&self.state).remote_selections = selections;
    }

    pub fn set_latest(&self, latest: LatestTake) {
        lock(&self.state).latest = latest;
    }

    pub fn add_source(&self, url: &str, bytes: Vec<u8>) {
        lock(&self.state).sources.insert(url.to_string(), bytes);
    }

    pub fn started_with(&self) -> Vec<DeviceSelections> {
        lock(&self.state).started_with.clone()
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }
}

impl RecordingService for MockRecordingService {
    fn start(&mut self, selections: &DeviceSelections) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.fail_start {
            return Err(SyncError::ServiceFailure(message.clone()));
        }
        state.started_with.push(selections.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<String> {
        let delay = lock(&self.state).stop_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let mut state = lock(&self.state);
        if let Some(message) = &state.fail_stop {
            return Err(SyncError::ServiceFailure(message.clone()));
        }
        state.stops += 1;
        state.next_session += 1;
        Ok(format!("session_{:04}", state.next_session))
    }

    fn device_selections(&mut self) -> Result<DeviceSelections> {
        lock(&self.state)
            .remote_selections
            .clone()
            .ok_or_else(|| SyncError::ServiceFailure("config unavailable".to_string()))
    }

    fn latest_take(&mut self) -> Result<LatestTake> {
        Ok(lock(&self.state).latest.clone())
    }

    fn fetch_source(&mut self, url: &str) -> Result<Vec<u8>> {
        lock(&self.state)
            .sources
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::ServiceFailure(format!("{} not found", url)))
    }
}

/// Queues spawned tasks until the test runs them, so a service request
/// stays in flight for as long as the test wants.
#[derive(Clone, Default)]
pub struct ManualSpawner {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl ManualSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Runs queued tasks in spawn order, including any they queue in turn.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = lock(&self.tasks).pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl TaskSpawner for ManualSpawner {
    fn spawn(&self, task: Task) {
        lock(&self.tasks).push_back(task);
    }
}
