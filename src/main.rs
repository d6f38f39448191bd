use clap::Parser;
use crossbeam::channel::unbounded;
use synthwave::{
    cli::{format_device_list, select_devices, validate_device, Args},
    event_loop::{spawn_stdin_reader, EventLoop},
    logging,
    midi::{DeviceId, InputPorts, MidirInputPorts, MidirOutputBackend, OutputBackend},
    service::HttpRecordingService,
    ui::StatusLine,
    Session, SessionOptions, Settings, SimulatedVideo, SystemClock, ThreadSpawner,
};
use std::path::PathBuf;

fn main() {
    let args = Args::parse();
    let settings_path = args.config.clone().or_else(|| Settings::default_path().ok());
    let mut settings = load_settings(settings_path.as_ref());
    args.apply(&mut settings);

    if let Err(e) = logging::init_logger(&settings.log_level) {
        eprintln!("{}", e);
    }
    log::info!("Application starting");

    let input_ports = MidirInputPorts::default();
    let outputs = MidirOutputBackend::default();
    let input_names = input_ports.port_names();

    let service = match HttpRecordingService::new(&settings.service_url, settings.service_timeout())
    {
        Ok(service) => service,
        Err(e) => {
            log::error!("Cannot create recording service client: {}", e);
            eprintln!("Cannot create recording service client: {}", e);
            std::process::exit(1);
        }
    };
    match service.health() {
        Ok(true) => log::info!("Recording service reachable at {}", service.base_url()),
        Ok(false) | Err(_) => log::warn!(
            "Recording service at {} is not healthy, recording will fail until it is",
            service.base_url()
        ),
    }

    if args.device_list {
        print!("{}", format_device_list(&input_names, &outputs.devices()));
        print_service_ports(&service);
        return;
    }

    if args.select_devices {
        pick_and_save_devices(&input_names, &outputs, &mut settings, settings_path.as_ref());
    }

    if let Some(port) = &args.input_port {
        if let Err(error_msg) = validate_device(port, &input_names) {
            log::error!("{}", error_msg);
            eprintln!("{}", error_msg);
            std::process::exit(1);
        }
    }

    let mut session = Session::new(
        Box::new(SystemClock::new()),
        Box::new(outputs),
        Box::new(input_ports),
        Box::new(service),
        Box::new(ThreadSpawner::named("service-worker")),
        SessionOptions::from(&settings),
    );
    session.attach_video(Box::new(SimulatedVideo::new(
        Box::new(SystemClock::new()),
        args.video_rate,
    )));

    match &settings.midi_output_device {
        Some(id) => {
            session.select_output(&DeviceId::new(id));
        }
        None => {
            if session.select_preferred_output().is_none() {
                log::warn!("No MIDI output devices found, playback is silent");
            }
        }
    }
    if !session.bind_input(settings.midi_input_port.as_deref()) {
        log::info!("MIDI input disabled");
    }
    if let Some(source) = &args.source {
        session.load_source_file(source);
    }

    let (command_tx, command_rx) = unbounded();
    spawn_stdin_reader(&ThreadSpawner::named("stdin-reader"), command_tx);

    println!("Commands: play, stop, seek <secs>, rewind, rec, latest, load <path>, out <id>, in <port>, thru on|off, export [path], quit");
    let mut event_loop = EventLoop::new(session, command_rx, settings.frame_interval())
        .with_status(StatusLine::new());
    event_loop.run();
    log::info!("Application exiting");
}

fn print_service_ports(service: &HttpRecordingService) {
    match service.ports() {
        Ok(listing) => {
            println!("Recording service audio devices:");
            for device in &listing.audio_devices {
                println!("  {}: {}", device.index, device.name);
            }
            println!("Recording service MIDI ports:");
            for port in &listing.midi_ports {
                println!("  - {}", port);
            }
        }
        Err(e) => println!("Recording service ports unavailable: {}", e),
    }
}

fn load_settings(path: Option<&PathBuf>) -> Settings {
    let Some(path) = path else {
        return Settings::default();
    };
    match Settings::load(path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Ignoring settings at {}: {}", path.display(), e);
            Settings::default()
        }
    }
}

fn pick_and_save_devices(
    input_names: &[String],
    outputs: &MidirOutputBackend,
    settings: &mut Settings,
    path: Option<&PathBuf>,
) {
    if let Err(e) = select_devices(input_names, &outputs.devices(), settings) {
        log::error!("Device selection failed: {}", e);
        return;
    }
    let Some(path) = path else {
        log::warn!("No settings path, device selection not persisted");
        return;
    };
    match settings.save(path) {
        Ok(()) => println!("Saved device selection to {}", path.display()),
        Err(e) => log::error!("Could not save settings to {}: {}", path.display(), e),
    }
}
