use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::midi::output::MidiOutputDevice;
use clap::Parser;
use dialoguer::Select;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List available MIDI input ports and output devices
    #[arg(long)]
    pub device_list: bool,

    /// Pick MIDI devices interactively and save them to the settings file
    #[arg(long)]
    pub select_devices: bool,

    /// Bind to a specific MIDI input port
    #[arg(long)]
    pub input_port: Option<String>,

    /// Send playback to a specific MIDI output device id
    #[arg(long)]
    pub output_device: Option<String>,

    /// Recording service base URL
    #[arg(long)]
    pub service_url: Option<String>,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// MIDI source (.mid or .json) to schedule at startup
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Echo live input to the MIDI output
    #[arg(long)]
    pub thru: bool,

    /// Playback rate of the simulated video, to exercise drift correction
    #[arg(long, default_value_t = 1.0)]
    pub video_rate: f64,

    /// File log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Command-line values win over loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.input_port {
            settings.midi_input_port = Some(port.clone());
        }
        if let Some(device) = &self.output_device {
            settings.midi_output_device = Some(device.clone());
        }
        if let Some(url) = &self.service_url {
            settings.service_url = url.clone();
        }
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        if self.thru {
            settings.midi_thru = true;
        }
    }
}

pub fn format_device_list(inputs: &[String], outputs: &[MidiOutputDevice]) -> String {
    let mut listing = String::from("MIDI input ports:\n");
    if inputs.is_empty() {
        listing.push_str("  (none)\n");
    }
    for port in inputs {
        listing.push_str(&format!("  - {}\n", port));
    }
    listing.push_str("MIDI output devices:\n");
    if outputs.is_empty() {
        listing.push_str("  (none)\n");
    }
    for device in outputs {
        listing.push_str(&format!("  - {} [{}]\n", device.name, device.id));
    }
    listing
}

pub fn validate_device(device_name: &str, devices: &[String]) -> std::result::Result<(), String> {
    if !devices.iter().any(|d| d == device_name) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}

/// Interactive input/output picker. The first entry of each list means
/// "none" (input) or "automatic" (output). Cancelling leaves a choice as is.
pub fn select_devices(
    inputs: &[String],
    outputs: &[MidiOutputDevice],
    settings: &mut Settings,
) -> Result<()> {
    let mut input_items = vec!["(none)".to_string()];
    input_items.extend(inputs.iter().cloned());
    let current_input = settings
        .midi_input_port
        .as_ref()
        .and_then(|p| inputs.iter().position(|i| i == p))
        .map_or(0, |i| i + 1);

    let choice = Select::new()
        .with_prompt("MIDI input port")
        .items(&input_items)
        .default(current_input)
        .interact_opt()
        .map_err(|e| SyncError::Config(e.to_string()))?;
    match choice {
        Some(0) => settings.midi_input_port = None,
        Some(i) => settings.midi_input_port = Some(inputs[i - 1].clone()),
        None => {}
    }

    let mut output_items = vec!["(automatic)".to_string()];
    output_items.extend(outputs.iter().map(|d| d.name.clone()));
    let current_output = settings
        .midi_output_device
        .as_ref()
        .and_then(|id| outputs.iter().position(|d| &d.id.0 == id))
        .map_or(0, |i| i + 1);

    let choice = Select::new()
        .with_prompt("MIDI output device")
        .items(&output_items)
        .default(current_output)
        .interact_opt()
        .map_err(|e| SyncError::Config(e.to_string()))?;
    match choice {
        Some(0) => settings.midi_output_device = None,
        Some(i) => settings.midi_output_device = Some(outputs[i - 1].id.0.clone()),
        None => {}
    }
    Ok(())
}
