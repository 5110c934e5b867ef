// src/utils/mod.rs
use log::{info, LevelFilter};

pub mod timing;

pub use timing::{Clock, ManualClock, SystemClock, Timer};

/// Parses a `LOG_LEVEL` style string, falling back to `Info`
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" | "CRITICAL" => LevelFilter::Error,
        "OFF" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logging(level: &str) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(parse_level(level))
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("redis", LevelFilter::Warn)
        // stdout carries command output
        .chain(std::io::stderr())
        .apply()?;
    info!("Logging initialized.");
    Ok(())
}
