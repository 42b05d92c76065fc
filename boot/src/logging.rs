use core::fmt::{self, Write};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};
use spin::{Mutex, Once};

/// Character output the log lines are printed to, usually the boot console.
pub trait Console: Sync {
    fn write_str(&self, s: &str);
}

struct ConsoleWriter<'a>(&'a dyn Console);

impl Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

pub struct Logger {
    console: Once<&'static dyn Console>,
    lock: Mutex<()>,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(console) = self.console.get() else {
            return;
        };
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 20,  // White
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        let _guard = self.lock.lock();
        // Nothing sensible is left to report a console failure to.
        let _ = writeln!(
            ConsoleWriter(*console),
            "\u{1B}[{}m[{:}] {}\u{1B}[0m",
            color,
            record.level(),
            record.args(),
        );
    }

    fn flush(&self) {}
}

/// Whether probe progress is reported at info instead of debug level.
pub const PROBES_VERBOSE: bool = config::DEBUG_PROBES != 0;

fn configured_level() -> LevelFilter {
    match config::LOG_LEVEL {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the console logger. Only the first call takes effect.
pub fn init(console: &'static dyn Console) -> Result<(), SetLoggerError> {
    static LOGGER: Logger = Logger {
        console: Once::new(),
        lock: Mutex::new(()),
    };
    LOGGER.console.call_once(|| console);
    set_logger(&LOGGER)?;
    set_max_level(configured_level());
    Ok(())
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log,Level};
            log!(target: $target, Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log,Level};
            log!(Level::Debug, $($arg)+)
        }
    }
}

/// Probe progress report, raised to info level by the `DEBUG_PROBES` flag.
#[macro_export]
macro_rules! report_probe {
    ($($arg:tt)+) => {
        if $crate::logging::PROBES_VERBOSE {
            log::info!($($arg)+)
        } else {
            log::debug!($($arg)+)
        }
    };
}
