//! Client side of the recording service.
//!
//! The service captures video, audio and MIDI for one recording session and
//! exposes the resulting artifacts by URL. The core only needs the contract
//! in [`RecordingService`]; [`HttpRecordingService`] speaks it over HTTP/JSON.
//!
//! Calls can take as long as the HTTP timeout, so the session never makes
//! them itself. It submits [`ServiceRequest`]s to a [`ServiceWorker`], which
//! runs them on spawned tasks and hands back [`ServiceEvent`]s.

use crate::error::{Result, SyncError};
use crate::spawner::TaskSpawner;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Devices the service should capture from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceSelections {
    pub video_device_index: u32,
    pub audio_device_index: Option<u32>,
    pub midi_port_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceReply {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Artifact URLs of the most recent take.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LatestTake {
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub midi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioDevice {
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PortListing {
    #[serde(default)]
    pub audio_devices: Vec<AudioDevice>,
    #[serde(default)]
    pub midi_ports: Vec<String>,
}

pub trait RecordingService: Send {
    /// Begins a session. Succeeds only when the service reports it started.
    fn start(&mut self, selections: &DeviceSelections) -> Result<()>;

    /// Ends the session and returns its id.
    fn stop(&mut self) -> Result<String>;

    /// Device selections stored on the service side.
    fn device_selections(&mut self) -> Result<DeviceSelections>;

    fn latest_take(&mut self) -> Result<LatestTake>;

    /// Downloads a MIDI source artifact.
    fn fetch_source(&mut self, url: &str) -> Result<Vec<u8>>;
}

impl ServiceReply {
    fn require(self, status: &str, fallback: &str) -> Result<ServiceReply> {
        if self.status == status {
            Ok(self)
        } else {
            Err(SyncError::ServiceFailure(
                self.message.unwrap_or_else(|| fallback.to_string()),
            ))
        }
    }
}

pub struct HttpRecordingService {
    base_url: String,
    client: Client,
}

impl HttpRecordingService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpRecordingService {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn health(&self) -> Result<bool> {
        let reply = read_reply(self.client.get(self.url("/health")).send()?)?;
        Ok(reply.status == "ok")
    }

    pub fn ports(&self) -> Result<PortListing> {
        let response = self.client.get(self.url("/ports")).send()?;
        Ok(checked(response)?.json()?)
    }
}

impl RecordingService for HttpRecordingService {
    fn start(&mut self, selections: &DeviceSelections) -> Result<()> {
        debug!("Starting recording with {:?}", selections);
        let response = self
            .client
            .post(self.url("/record/start"))
            .json(selections)
            .send()?;
        read_reply(response)?.require("started", "Failed to start recording")?;
        info!("Recording service started a session");
        Ok(())
    }

    fn stop(&mut self) -> Result<String> {
        let response = self.client.post(self.url("/record/stop")).send()?;
        let reply = read_reply(response)?.require("stopped", "Failed to stop recording")?;
        let session_id = reply.session_id.unwrap_or_default();
        info!("Recording service saved session {}", session_id);
        Ok(session_id)
    }

    fn device_selections(&mut self) -> Result<DeviceSelections> {
        let response = self.client.get(self.url("/config")).send()?;
        let config: Value = checked(response)?.json()?;
        Ok(selections_from_config(&config))
    }

    fn latest_take(&mut self) -> Result<LatestTake> {
        let response = self.client.get(self.url("/recordings/latest")).send()?;
        Ok(checked(response)?.json()?)
    }

    fn fetch_source(&mut self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.url(url)).send()?;
        Ok(checked(response)?.bytes()?.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    /// Start with the service's stored selections, or `fallback` when the
    /// service cannot provide them.
    Start { fallback: DeviceSelections },
    Stop,
    LatestTake,
    FetchSource(String),
}

/// Outcome of a [`ServiceRequest`], delivered back to the session.
#[derive(Debug)]
pub enum ServiceEvent {
    Started(Result<DeviceSelections>),
    Stopped(Result<String>),
    LatestTake(Result<LatestTake>),
    Source { url: String, result: Result<Vec<u8>> },
}

/// Runs one request to completion. Blocks for as long as the service does.
pub fn run_request(service: &mut dyn RecordingService, request: ServiceRequest) -> ServiceEvent {
    match request {
        ServiceRequest::Start { fallback } => {
            let selections = match service.device_selections() {
                Ok(selections) => selections,
                Err(e) => {
                    warn!(
                        "Failed to fetch config for recording, falling back to local settings: {}",
                        e
                    );
                    fallback
                }
            };
            ServiceEvent::Started(service.start(&selections).map(|()| selections))
        }
        ServiceRequest::Stop => ServiceEvent::Stopped(service.stop()),
        ServiceRequest::LatestTake => ServiceEvent::LatestTake(service.latest_take()),
        ServiceRequest::FetchSource(url) => {
            let result = service.fetch_source(&url);
            ServiceEvent::Source { url, result }
        }
    }
}

/// Owns the recording service and runs requests against it on spawned
/// tasks. Requests are serialized by the service lock; replies arrive on
/// [`ServiceWorker::events`] in completion order.
pub struct ServiceWorker {
    service: Arc<Mutex<Box<dyn RecordingService>>>,
    spawner: Box<dyn TaskSpawner>,
    events_tx: Sender<ServiceEvent>,
    events_rx: Receiver<ServiceEvent>,
}

impl ServiceWorker {
    pub fn new(service: Box<dyn RecordingService>, spawner: Box<dyn TaskSpawner>) -> Self {
        let (events_tx, events_rx) = unbounded();
        ServiceWorker {
            service: Arc::new(Mutex::new(service)),
            spawner,
            events_tx,
            events_rx,
        }
    }

    pub fn submit(&self, request: ServiceRequest) {
        debug!("Submitting {:?}", request);
        let service = Arc::clone(&self.service);
        let events = self.events_tx.clone();
        self.spawner.spawn(Box::new(move || {
            let event = {
                let mut service = service
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                run_request(service.as_mut(), request)
            };
            if events.send(event).is_err() {
                debug!("Service reply dropped, session is gone");
            }
        }));
    }

    pub fn events(&self) -> Receiver<ServiceEvent> {
        self.events_rx.clone()
    }

    pub fn try_event(&self) -> Option<ServiceEvent> {
        self.events_rx.try_recv().ok()
    }
}

fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::ServiceFailure(format!(
            "{} answered HTTP {}",
            response.url(),
            status
        )))
    }
}

// The service answers with a status body even on failure, so the body is
// read before the HTTP status is considered.
fn read_reply(response: Response) -> Result<ServiceReply> {
    let status = response.status();
    match response.json::<ServiceReply>() {
        Ok(reply) => Ok(reply),
        Err(e) if status.is_success() => Err(e.into()),
        Err(_) => Err(SyncError::ServiceFailure(format!("HTTP {}", status))),
    }
}

/// Reads the service's stored settings. Values may arrive as numbers or
/// strings, and `"default"` / `"none"` mean unset.
pub fn selections_from_config(config: &Value) -> DeviceSelections {
    let index = |key: &str| -> Option<u32> {
        match config.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    };
    let midi_port_name = config
        .get("midiPortName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty() && *s != "none")
        .map(str::to_string);
    if midi_port_name.is_none() {
        warn!("Service config names no MIDI port");
    }

    DeviceSelections {
        video_device_index: index("videoDeviceIndex").unwrap_or(0),
        audio_device_index: index("audioDeviceIndex"),
        midi_port_name,
    }
}
