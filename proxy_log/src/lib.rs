use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{SyncSender, sync_channel};
use std::sync::OnceLock;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap();
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

/// Severity, ordered from most to least verbose. Matches the original
/// project's `LOG_DEBUG..LOG_ERROR` level-gate convention: a record is
/// emitted only if its level is `>=` the configured minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Trace => "35", // Magenta
            Level::Debug => "36", // Cyan
            Level::Info => "32",  // Green
            Level::Warn => "33",  // Yellow
            Level::Error => "31", // Red
        }
    }
}

struct Logger {
    tx: SyncSender<String>,
}

static ENABLED: AtomicBool = AtomicBool::new(true);
static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Starts the async writer thread and sets the initial filter. Idempotent:
/// a second call only updates `enabled`/`level`, the writer thread and its
/// queue are created once per process.
pub fn init(enabled: bool, level: Level, queue_capacity: usize) {
    ENABLED.store(enabled, Ordering::SeqCst);
    LEVEL.store(level as u8, Ordering::SeqCst);
    LOGGER.get_or_init(|| {
        let (tx, rx) = sync_channel::<String>(queue_capacity.max(1));
        thread::Builder::new()
            .name("log-writer".into())
            .spawn(move || {
                for line in rx {
                    println!("{line}");
                }
            })
            .expect("spawn log writer thread");
        Logger { tx }
    });
}

pub fn is_open() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn get_level() -> u8 {
    LEVEL.load(Ordering::Relaxed)
}

pub fn set_level(level: Level) {
    LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Formats and enqueues one log line. Blocks the caller if the bounded
/// queue is full rather than dropping the record (see invariant: log
/// ordering / backpressure over silent loss).
pub fn log_line(level: Level, line: String) {
    if !is_open() || (level as u8) < get_level() {
        return;
    }
    let ts = format_time(SystemTime::now());
    let formatted = format!(
        "[{}] \x1b[30m #|| web-server ||# \x1b[0m \x1b[{}m{}\x1b[0m: {}",
        ts,
        level.color(),
        level.tag(),
        line
    );
    match LOGGER.get() {
        Some(logger) => {
            let _ = logger.tx.send(formatted);
        }
        None => println!("{formatted}"),
    }
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log_line($level, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Info, $($arg)*) };
}
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Warn, $($arg)*) };
}
#[macro_export]
macro_rules! errors {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Error, $($arg)*) };
}
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Debug, $($arg)*) };
}
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_suppresses_everything() {
        ENABLED.store(false, Ordering::SeqCst);
        // log_line must not panic and must return immediately without a
        // writer thread present.
        log_line(Level::Error, "should not print".into());
        ENABLED.store(true, Ordering::SeqCst);
    }

    #[test]
    fn level_filter_gates_by_severity() {
        LEVEL.store(Level::Warn as u8, Ordering::SeqCst);
        assert!((Level::Error as u8) >= get_level());
        assert!((Level::Info as u8) < get_level());
        LEVEL.store(Level::Info as u8, Ordering::SeqCst);
    }
}
