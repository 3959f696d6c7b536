//! Stderr logger for the `log` facade
//!
//! The level comes from `NVOC_LOG` when set, otherwise from the `-v` count.

use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

struct StderrLogger {
    level: LevelFilter,
    choice: ColorChoice,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stream = StandardStream::stderr(self.choice);
        let mut stderr = stream.lock();
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(level_color(record.level()))).set_bold(true);
        let _ = stderr.set_color(&spec);
        let _ = write!(stderr, "{:>5}", record.level());
        let _ = stderr.reset();
        let _ = writeln!(stderr, " {}: {}", record.target(), record.args());
    }

    fn flush(&self) {}
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Cyan,
        Level::Trace => Color::Magenta,
    }
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn resolve_level(env: Option<&str>, verbosity: u8) -> LevelFilter {
    env.and_then(|value| value.trim().parse::<LevelFilter>().ok())
        .unwrap_or_else(|| level_from_verbosity(verbosity))
}

/// Install the logger; later calls are ignored.
pub fn init(verbosity: u8, choice: ColorChoice) {
    let env = std::env::var("NVOC_LOG").ok();
    let level = resolve_level(env.as_deref(), verbosity);
    let logger: &'static StderrLogger = Box::leak(Box::new(StderrLogger { level, choice }));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}
