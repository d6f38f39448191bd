use crate::error::{Result, SyncError};
use simplelog::*;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Once;

static INIT: Once = Once::new();

/// `$HOME/.local/share/synthwave/logs`
pub fn log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| SyncError::Config("HOME environment variable not set".to_string()))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("synthwave")
        .join("logs"))
}

/// Unknown names fall back to `Debug`.
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Debug)
}

/// File logger at `level` plus warnings on stderr. Later calls are no-ops.
pub fn init_logger(level: &str) -> Result<()> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("synthwave.log"))?;

    let mut result = Ok(());
    INIT.call_once(|| {
        let loggers: Vec<Box<dyn SharedLogger>> = vec![
            TermLogger::new(
                LevelFilter::Warn,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ),
            WriteLogger::new(parse_level(level), Config::default(), log_file),
        ];
        if let Err(e) = CombinedLogger::init(loggers) {
            result = Err(SyncError::Config(format!("Logger initialization failed: {}", e)));
        }
    });
    result
}
