//! Diagnostic logging and stream routing.
//!
//! When the process serves MCP over stdio, stdout belongs to the protocol and every byte that is
//! not a JSON-RPC frame corrupts the session. The execution mode is therefore detected once at
//! startup and every log line is routed accordingly:
//!
//! - `ProtocolEndpoint` (stdout is not a terminal and `MCP_SERVER_MODE` is not `false`): all
//!   severities go to stderr, without ANSI colors.
//! - `Interactive`: errors and warnings go to stderr, info and debug to stdout, colorized.
//!
//! Loggers are cheap per-module handles sharing one [`LoggerContext`], which is built in `main`
//! and passed explicitly. The severity threshold lives in that context, so
//! [`LoggerContext::set_log_level`] affects every handle, including ones created earlier.
//!
//! `tracing` events (emitted by the MCP SDK and by this crate) are routed by [`init_tracing`],
//! which applies the same rules to the global subscriber.
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tracing_fmt, prelude::*, reload};

/// Environment variable selecting the minimum severity.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
/// Environment variable that forces interactive mode when set to `false`.
pub const SERVER_MODE_ENV: &str = "MCP_SERVER_MODE";
/// Environment variable naming an optional file that receives a copy of `tracing` output.
pub const LOG_FILE_ENV: &str = "MCP_LOG_FILE";

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const GRAY: &str = "\x1b[90m";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Log severity. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Failures the operator must act on.
    Error = 0,
    /// Unexpected but recoverable conditions.
    Warn = 1,
    /// Lifecycle events. The default threshold.
    Info = 2,
    /// Detailed troubleshooting output.
    Debug = 3,
}

/// Returned when a string does not name a [`LogLevel`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level `{0}` (expected error, warn, info or debug)")]
pub struct ParseLogLevelError(String);

impl LogLevel {
    /// Upper-case label used in the line prefix.
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Parse a raw `LOG_LEVEL` value. Absent or unrecognized values yield [`LogLevel::Info`].
    pub fn from_env_value(value: Option<&str>) -> Self {
        value
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Self::Info)
    }

    /// Read the threshold from `LOG_LEVEL`.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(LOG_LEVEL_ENV).ok().as_deref())
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            _ => Self::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the process is being run, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A human terminal is attached, or protocol mode was explicitly disabled.
    Interactive,
    /// stdout carries MCP frames; logs must stay on stderr.
    ProtocolEndpoint,
}

/// Output channel a log line is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// stdout in production. Never used in [`ExecutionMode::ProtocolEndpoint`].
    Primary,
    /// stderr in production.
    Diagnostic,
}

impl ExecutionMode {
    /// Classify the process: protocol endpoint unless the override is exactly `false` or
    /// stdout is a terminal.
    pub fn detect(server_mode_override: Option<&str>, stdout_is_terminal: bool) -> Self {
        if server_mode_override != Some("false") && !stdout_is_terminal {
            Self::ProtocolEndpoint
        } else {
            Self::Interactive
        }
    }

    /// Detect the mode from `MCP_SERVER_MODE` and the real stdout.
    pub fn from_process() -> Self {
        Self::detect(
            std::env::var(SERVER_MODE_ENV).ok().as_deref(),
            io::stdout().is_terminal(),
        )
    }

    /// Whether ANSI color sequences are emitted.
    pub fn color_enabled(self) -> bool {
        matches!(self, Self::Interactive)
    }

    /// Stream that receives lines of the given severity.
    pub fn stream_for(self, level: LogLevel) -> Stream {
        match (self, level) {
            (Self::ProtocolEndpoint, _) | (_, LogLevel::Error | LogLevel::Warn) => {
                Stream::Diagnostic
            }
            (Self::Interactive, LogLevel::Info | LogLevel::Debug) => Stream::Primary,
        }
    }

    fn color(self, level: LogLevel) -> &'static str {
        if !self.color_enabled() {
            return "";
        }
        match level {
            LogLevel::Error => RED,
            LogLevel::Warn => YELLOW,
            LogLevel::Info => BLUE,
            LogLevel::Debug => GRAY,
        }
    }

    fn reset(self) -> &'static str {
        if self.color_enabled() { RESET } else { "" }
    }
}

type Sink = Mutex<Box<dyn Write + Send>>;

/// Process-scoped logging state shared by every [`Logger`].
pub struct LoggerContext {
    mode: ExecutionMode,
    min_level: AtomicU8,
    primary: Sink,
    diagnostic: Sink,
    tracing_filter: OnceLock<reload::Handle<EnvFilter, Registry>>,
}

impl LoggerContext {
    /// Build a context writing to the given primary and diagnostic sinks.
    pub fn new<P, D>(mode: ExecutionMode, level: LogLevel, primary: P, diagnostic: D) -> Self
    where
        P: Write + Send + 'static,
        D: Write + Send + 'static,
    {
        Self {
            mode,
            min_level: AtomicU8::new(level as u8),
            primary: Mutex::new(Box::new(primary)),
            diagnostic: Mutex::new(Box::new(diagnostic)),
            tracing_filter: OnceLock::new(),
        }
    }

    /// Build the production context: stdout/stderr, mode detected from the process and
    /// threshold read from `LOG_LEVEL`.
    pub fn from_process() -> Arc<Self> {
        Arc::new(Self::new(
            ExecutionMode::from_process(),
            LogLevel::from_env(),
            io::stdout(),
            io::stderr(),
        ))
    }

    /// Execution mode fixed at construction.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Current severity threshold.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    /// Change the threshold for every existing and future logger sharing this context.
    ///
    /// Relaxed ordering: another thread may briefly observe the previous threshold.
    /// A `tracing` filter built by [`LoggerContext::tracing_filter_layer`] follows the change.
    pub fn set_log_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
        if let Some(handle) = self.tracing_filter.get() {
            let _ = handle.reload(EnvFilter::new(level.filter_directive()));
        }
    }

    /// Build a reloadable `tracing` filter at the current threshold.
    ///
    /// Only the first layer built is kept in sync by [`LoggerContext::set_log_level`].
    pub fn tracing_filter_layer(&self) -> reload::Layer<EnvFilter, Registry> {
        let filter = EnvFilter::new(self.log_level().filter_directive());
        let (layer, handle) = reload::Layer::new(filter);
        let _ = self.tracing_filter.set(handle);
        layer
    }

    /// Whether a message at `level` passes the threshold.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.log_level()
    }

    /// Create a logger labelled with `module`.
    pub fn logger(self: &Arc<Self>, module: impl Into<Arc<str>>) -> Logger {
        Logger {
            module: module.into(),
            context: Arc::clone(self),
        }
    }

    fn write(&self, stream: Stream, bytes: &[u8]) {
        let sink = match stream {
            Stream::Primary => &self.primary,
            Stream::Diagnostic => &self.diagnostic,
        };
        let mut writer = sink.lock().unwrap_or_else(PoisonError::into_inner);
        // A broken stream is not the caller's problem.
        let _ = writer.write_all(bytes).and_then(|()| writer.flush());
    }
}

impl fmt::Debug for LoggerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerContext")
            .field("mode", &self.mode)
            .field("min_level", &self.log_level())
            .finish_non_exhaustive()
    }
}

/// Create a logger labelled with `module` on the shared `context`.
pub fn get_logger(context: &Arc<LoggerContext>, module: impl Into<Arc<str>>) -> Logger {
    context.logger(module)
}

/// Per-module logging handle.
///
/// Logging never fails: write and serialization errors are swallowed.
#[derive(Clone)]
pub struct Logger {
    module: Arc<str>,
    context: Arc<LoggerContext>,
}

impl Logger {
    /// Module label printed in each line.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Shared context this logger writes through.
    pub fn context(&self) -> &Arc<LoggerContext> {
        &self.context
    }

    /// Log at [`LogLevel::Error`].
    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, &message, None::<&()>);
    }

    /// Log at [`LogLevel::Error`] followed by a JSON payload.
    pub fn error_with<T: Serialize + ?Sized>(&self, message: impl fmt::Display, data: &T) {
        self.log(LogLevel::Error, &message, Some(data));
    }

    /// Log at [`LogLevel::Warn`].
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, &message, None::<&()>);
    }

    /// Log at [`LogLevel::Warn`] followed by a JSON payload.
    pub fn warn_with<T: Serialize + ?Sized>(&self, message: impl fmt::Display, data: &T) {
        self.log(LogLevel::Warn, &message, Some(data));
    }

    /// Log at [`LogLevel::Info`].
    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, &message, None::<&()>);
    }

    /// Log at [`LogLevel::Info`] followed by a JSON payload.
    pub fn info_with<T: Serialize + ?Sized>(&self, message: impl fmt::Display, data: &T) {
        self.log(LogLevel::Info, &message, Some(data));
    }

    /// Log at [`LogLevel::Debug`].
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, &message, None::<&()>);
    }

    /// Log at [`LogLevel::Debug`] followed by a JSON payload.
    pub fn debug_with<T: Serialize + ?Sized>(&self, message: impl fmt::Display, data: &T) {
        self.log(LogLevel::Debug, &message, Some(data));
    }

    /// Emit one line and, when `data` renders to something other than `null`, a second write
    /// with the pretty-printed payload. The two writes are separately atomic.
    pub fn log<T: Serialize + ?Sized>(
        &self,
        level: LogLevel,
        message: &dyn fmt::Display,
        data: Option<&T>,
    ) {
        if !self.context.enabled(level) {
            return;
        }
        let mode = self.context.mode;
        let stream = mode.stream_for(level);
        let line = format_line(mode, level, &self.module, message);
        self.context.write(stream, line.as_bytes());

        if let Some(payload) = data.and_then(render_payload::<T>) {
            self.context.write(stream, payload.as_bytes());
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Format a complete line, newline included: `{color}[LEVEL][module]{reset} message`.
pub fn format_line(
    mode: ExecutionMode,
    level: LogLevel,
    module: &str,
    message: &dyn fmt::Display,
) -> String {
    format!(
        "{color}[{label}][{module}]{reset} {message}\n",
        color = mode.color(level),
        label = level.label(),
        reset = mode.reset(),
    )
}

fn render_payload<T: Serialize + ?Sized>(data: &T) -> Option<String> {
    let value = serde_json::to_value(data).ok()?;
    if value.is_null() {
        return None;
    }
    let mut rendered = serde_json::to_string_pretty(&value).ok()?;
    rendered.push('\n');
    Some(rendered)
}

/// Install the global `tracing` subscriber so SDK and crate events obey the stream rules.
///
/// - Respects `RUST_LOG`, which pins the filter; otherwise filters at the context's threshold
///   and follows later [`LoggerContext::set_log_level`] calls.
/// - Always writes to stderr; ANSI colors only in interactive mode.
/// - Mirrors output to `MCP_LOG_FILE` when it is set.
///
/// Calling this more than once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(context: &LoggerContext) {
    type BoxedFilter = Box<dyn Layer<Registry> + Send + Sync>;
    let filter: BoxedFilter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter.boxed(),
        Err(_) => context.tracing_filter_layer().boxed(),
    };
    let stderr_layer = tracing_fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(context.mode().color_enabled())
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = tracing_fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        let _ = registry.with(file_layer).try_init();
    } else {
        let _ = registry.try_init();
    }
}

/// Build a non-blocking writer for `MCP_LOG_FILE`.
///
/// Returns `None` when the variable is unset or the file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let path = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())?;
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {path}: {err}");
            None
        }
    }
}
