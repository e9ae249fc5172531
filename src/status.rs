use std::env;

use colored::*;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Environment variable selecting how much the library logs.
pub const LOG_VAR: &str = "SDX_LOG";

pub enum Kind {
    Info,
    Warn,
    Fatal,
    Debug,
}

pub struct Status(pub Kind, pub &'static str);

impl Status {
    pub fn info() -> Status {
        Status(Kind::Info, "Info")
    }
    pub fn warn() -> Status {
        Status(Kind::Warn, "Warning")
    }
    pub fn fatal() -> Status {
        Status(Kind::Fatal, "Fatal")
    }
    pub fn debug() -> Status {
        Status(Kind::Debug, "Debug")
    }

    fn tag(&self) -> ColoredString {
        match self.0 {
            Kind::Info => self.1.blue(),
            Kind::Warn => self.1.yellow(),
            Kind::Fatal => self.1.red(),
            Kind::Debug => self.1.purple(),
        }
        .bold()
    }

    fn multiline(&self, lines: Vec<&str>) {
        eprintln!("\n{}", self.tag());
        for line in lines {
            eprintln!("{}", line);
        }
        eprintln!()
    }

    pub fn log(&self, message: &str) {
        let lines = message.lines().collect::<Vec<&str>>();

        if lines.len() > 1 {
            self.multiline(lines);
        } else {
            eprintln!("{:>12} {}", self.tag(), message);
        }
    }
}

/// Prints library log records as status lines.
pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    /// Installs the logger at the level named by `SDX_LOG`,
    /// `warn` when unset or unrecognized.
    pub fn init() {
        let level = env::var(LOG_VAR)
            .ok()
            .and_then(|level| level.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Warn);

        let logger: &'static Logger = Box::leak(Box::new(Logger { level }));
        if log::set_logger(logger).is_ok() {
            log::set_max_level(level);
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let status = match record.level() {
            Level::Error => Status::fatal(),
            Level::Warn => Status::warn(),
            Level::Info => Status::info(),
            Level::Debug | Level::Trace => Status::debug(),
        };
        status.log(&record.args().to_string());
    }

    fn flush(&self) {}
}
