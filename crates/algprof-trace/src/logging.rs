//! Log sink shared by the profiling service and its host.
//!
//! Every line is written while holding the sink's stream lock, so a caller
//! that takes the lock with [`LogSink::lock`] can emit a multi-line block
//! without other producers interleaving.

use log::{Level, LevelFilter, Metadata, Record};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct LogSink {
    out: Mutex<Box<dyn Write + Send>>,
    max_level: LevelFilter,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

impl LogSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        LogSink {
            out: Mutex::new(Box::new(out)),
            max_level: LevelFilter::Trace,
        }
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Drop records above `level` when used through the `log` facade
    pub fn with_max_level(mut self, level: LevelFilter) -> Self {
        self.max_level = level;
        self
    }

    /// Install as the global `log` logger so `log::info!` and friends share
    /// this sink's lock.
    pub fn install(self: &Arc<Self>) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(Arc::clone(self)))?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Exclusive access to the output stream until the guard is dropped
    pub fn lock(&self) -> LogStreamGuard<'_> {
        LogStreamGuard {
            out: self.out.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Write one line attributed to `source`
    pub fn write_line(&self, source: &str, level: Level, args: fmt::Arguments<'_>) {
        let mut out = self.lock();
        // A failing sink must not take the pipeline down with it
        let _ = writeln!(out, "{source:<24}{level:>6}: {args}");
    }
}

impl log::Log for LogSink {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.write_line(record.target(), record.level(), *record.args());
        }
    }

    fn flush(&self) {
        let _ = self.lock().flush();
    }
}

/// Held stream lock of a [`LogSink`]
pub struct LogStreamGuard<'a> {
    out: MutexGuard<'a, Box<dyn Write + Send>>,
}

impl Write for LogStreamGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Leveled logging on behalf of one named component
#[derive(Debug, Clone)]
pub struct Logger {
    source: String,
    level: LevelFilter,
    sink: Arc<LogSink>,
}

impl Logger {
    pub fn new(source: impl Into<String>, level: LevelFilter, sink: Arc<LogSink>) -> Self {
        Logger {
            source: source.into(),
            level,
            sink,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.enabled(level) {
            self.sink.write_line(&self.source, level, args);
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }
}

/// Cloneable in-memory writer, for capturing what a sink wrote
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
