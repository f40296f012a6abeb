use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use syslog::{Facility, Formatter3164, Logger, LoggerBackend};

static SYSLOG: OnceLock<Mutex<Logger<LoggerBackend, Formatter3164>>> = OnceLock::new();

/// Switches the sink from stderr to the system log. Called once, after
/// daemonization. Idempotent: a second call is a no-op.
pub fn use_syslog(program_name: &str) -> Result<(), syslog::Error> {
    let formatter = Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: program_name.to_string(),
        pid: std::process::id(),
    };
    let logger = syslog::unix(formatter)?;
    let _ = SYSLOG.set(Mutex::new(logger));
    Ok(())
}

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = duration.as_secs();

    let year = 1970 + (secs / 31_557_600); // Rough years
    let month = ((secs % 31_557_600) / 2_628_000) as u8 + 1;
    let day = ((secs % 2_628_000) / 86_400) as u8 + 1;
    let hour = ((secs % 86_400) / 3600) as u8;
    let minute = ((secs % 3600) / 60) as u8;
    let second = (secs % 60) as u8;

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

/// Sends one formatted line to whichever sink is active: stderr until
/// [`use_syslog`] has been called, the system log afterward.
pub fn emit(level: &str, color: &str, message: &str) {
    if let Some(logger) = SYSLOG.get() {
        if let Ok(mut logger) = logger.lock() {
            let _ = match level.trim() {
                "ERROR" => logger.err(message),
                "WARN" => logger.warning(message),
                "DEBUG" | "TRACE" => logger.debug(message),
                _ => logger.info(message),
            };
        }
        return;
    }

    let ts = format_time(SystemTime::now());
    eprintln!(
        "[{}] \x1b[30m#|| gopher-gateway ||#\x1b[0m \x1b[{}m{}\x1b[0m: {}",
        ts, color, level, message
    );
}

#[macro_export]
macro_rules! log {
    ($level:expr, $color:expr, $($arg:tt)*) => {
        $crate::emit($level, $color, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::log!("INFO ", "32", $($arg)*); }; } // Green
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::log!("WARN ", "33", $($arg)*); }; } // Yellow
#[macro_export]
macro_rules! errors { ($($arg:tt)*) => { $crate::log!("ERROR", "31", $($arg)*); }; } // Red
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::log!("DEBUG", "36", $($arg)*); }; } // Cyan
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::log!("TRACE", "34", $($arg)*); }; } // Blue
