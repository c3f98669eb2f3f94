//! Folio Logging
//!
//! Small, dependency-light logging layer shared by the Folio crates. Output
//! goes to stderr, one line per record, and is controlled entirely through
//! environment variables so that embedding applications never have to wire
//! up a logger before analytics calls start arriving.
//!
//! # Usage
//!
//! ```rust
//! use folio_log::{debug, error, info, warn};
//!
//! info!("report built for {} days", 30);
//! debug!(target: "folio::analytics::ingest", "profile not found: {}", "alice");
//! warn!("title lookup degraded");
//! error!("store unreachable");
//! ```
//!
//! # Environment Variables
//!
//! - `FOLIO_DEBUG=1` - Enable debug logging
//! - `FOLIO_LOG_LEVEL=trace|debug|info|warn|error|off` - Minimum level
//! - `FOLIO_LOG_FORMAT=pretty|compact|json` - Output format (default `json`)
//! - `FOLIO_LOG_TIMESTAMPS=1|0` - Include timestamps (default on)

use once_cell::sync::Lazy;
use std::env;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

// ============================================================================
// Levels and formats
// ============================================================================

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    /// Suppresses every record
    Off = 5,
}

impl Level {
    /// Upper-case name used in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line layout for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `2026-10-18 09:30:00.123 INFO  [target] message`
    Pretty,
    /// `09:30:00 I target: message`
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

// ============================================================================
// Global state
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Resolved logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            timestamps: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Read the `FOLIO_*` variables and publish the level to the global atomics.
    pub fn from_env() -> Self {
        let config = Self::from_env_prefixed("FOLIO_");

        DEBUG_ENABLED.store(config.debug, Ordering::SeqCst);
        LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);

        config
    }

    /// Read `{prefix}DEBUG` and `{prefix}LOG_*` without touching global state.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let var = |suffix: &str| env::var(format!("{prefix}{suffix}")).ok();
        let debug = env_flag(&format!("{prefix}DEBUG")).unwrap_or(false);

        let level = var("LOG_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = var("LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let timestamps = env_flag(&format!("{prefix}LOG_TIMESTAMPS")).unwrap_or(true);

        Self {
            debug,
            level,
            format,
            timestamps,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Force the lazy configuration to load.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// Resolved configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

#[inline]
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Whether records at `level` are currently emitted.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    init();
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn current_level() -> Level {
    init();
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Change the minimum level at runtime.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Toggle debug mode; enabling it lowers the level to at least `Debug`.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        LOG_LEVEL.store(Level::Debug as u8, Ordering::SeqCst);
    }
}

// ============================================================================
// Output
// ============================================================================

/// Write one record. Called by the macros; prefer those.
#[doc(hidden)]
pub fn emit(level: Level, target: &str, message: &str) {
    let config = config();
    if !is_level_enabled(level) {
        return;
    }

    let line = render(config, level, target, message);
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{line}");
}

fn render(config: &LogConfig, level: Level, target: &str, message: &str) -> String {
    match config.format {
        Format::Pretty => {
            let mut line = String::new();
            if config.timestamps {
                line.push_str(&chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f ").to_string());
            }
            line.push_str(&format!("{:5} ", level.as_str()));
            if !target.is_empty() {
                line.push_str(&format!("[{target}] "));
            }
            line.push_str(message);
            line
        }
        Format::Compact => {
            let mut line = String::new();
            if config.timestamps {
                line.push_str(&chrono::Local::now().format("%H:%M:%S ").to_string());
            }
            line.push(level.as_str().chars().next().unwrap_or('?'));
            line.push(' ');
            if !target.is_empty() {
                line.push_str(target);
                line.push_str(": ");
            }
            line.push_str(message);
            line
        }
        Format::Json => render_json(config, level, target, message),
    }
}

#[cfg(feature = "json")]
fn render_json(config: &LogConfig, level: Level, target: &str, message: &str) -> String {
    #[derive(serde::Serialize)]
    struct Record<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        level: &'a str,
        target: &'a str,
        message: &'a str,
    }

    let record = Record {
        timestamp: config.timestamps.then(|| chrono::Utc::now().to_rfc3339()),
        level: level.as_str(),
        target,
        message,
    };

    serde_json::to_string(&record).unwrap_or_else(|_| message.to_string())
}

#[cfg(not(feature = "json"))]
fn render_json(config: &LogConfig, level: Level, target: &str, message: &str) -> String {
    let mut out = String::from("{");
    if config.timestamps {
        out.push_str(&format!(r#""timestamp":"{}","#, chrono::Utc::now().to_rfc3339()));
    }
    out.push_str(&format!(
        r#""level":"{}","target":"{}","message":"{}"}}"#,
        level.as_str(),
        escape_json(target),
        escape_json(message)
    ));
    out
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __folio_log {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::emit($level, $target, &format!($($arg)+));
        }
    };
    ($level:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::emit($level, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log at trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => { $crate::__folio_log!($crate::Level::Trace, $($arg)+) };
}

/// Log at debug level.
///
/// ```rust
/// use folio_log::debug;
///
/// let slug = "alice";
/// debug!(target: "folio::analytics::ingest", "unknown slug {}", slug);
/// ```
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::__folio_log!($crate::Level::Debug, $($arg)+) };
}

/// Log at info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::__folio_log!($crate::Level::Info, $($arg)+) };
}

/// Log at warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::__folio_log!($crate::Level::Warn, $($arg)+) };
}

/// Log at error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => { $crate::__folio_log!($crate::Level::Error, $($arg)+) };
}

// ============================================================================
// Tracing bridge
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Build a `tracing` subscriber honouring `FOLIO_LOG_LEVEL`.

    use super::*;

    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{EnvFilter, fmt};

        let directive = match config().level {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("DEBUG".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("warning".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("none".parse::<Level>(), Ok(Level::Off));
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("json".parse::<Format>(), Ok(Format::Json));
        assert_eq!(" Pretty ".parse::<Format>(), Ok(Format::Pretty));
        assert!("xml".parse::<Format>().is_err());
    }

    fn set_vars(prefix: &str, vars: &[(&str, &str)]) {
        for (suffix, value) in vars {
            // SAFETY: each test uses its own prefix, so no other thread reads these names
            unsafe { env::set_var(format!("{prefix}{suffix}"), value) };
        }
    }

    #[test]
    fn test_config_from_env() {
        let prefix = "FOLIO_TEST_LOG_OVERRIDES_";
        set_vars(
            prefix,
            &[
                ("LOG_LEVEL", "warn"),
                ("LOG_FORMAT", "compact"),
                ("LOG_TIMESTAMPS", "0"),
            ],
        );

        let config = LogConfig::from_env_prefixed(prefix);
        assert!(!config.debug);
        assert_eq!(config.level, Level::Warn);
        assert_eq!(config.format, Format::Compact);
        assert!(!config.timestamps);
    }

    #[test]
    fn test_config_from_env_debug_and_defaults() {
        let prefix = "FOLIO_TEST_LOG_DEBUG_";
        set_vars(prefix, &[("DEBUG", "true"), ("LOG_FORMAT", "xml")]);

        let config = LogConfig::from_env_prefixed(prefix);
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);
        assert_eq!(config.format, Format::Json);
        assert!(config.timestamps);
    }

    #[test]
    fn test_off_is_never_enabled() {
        assert!(!is_level_enabled(Level::Off));
    }

    #[test]
    fn test_render_compact() {
        let config = LogConfig {
            format: Format::Compact,
            timestamps: false,
            ..Default::default()
        };
        let line = render(&config, Level::Warn, "folio::test", "slow store");
        assert_eq!(line, "W folio::test: slow store");
    }

    #[test]
    fn test_render_pretty_without_target() {
        let config = LogConfig {
            format: Format::Pretty,
            timestamps: false,
            ..Default::default()
        };
        assert_eq!(render(&config, Level::Info, "", "ready"), "INFO  ready");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_render_json() {
        let config = LogConfig {
            timestamps: false,
            ..Default::default()
        };
        let line = render(&config, Level::Error, "folio", "store \"down\"");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "ERROR");
        assert_eq!(value["message"], "store \"down\"");
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_set_level_roundtrip() {
        let original = current_level();
        set_level(Level::Error);
        assert_eq!(current_level(), Level::Error);
        set_level(original);
    }

    #[tokio::test]
    async fn test_macros_from_async_context() {
        let count = 3;
        trace!("trace {}", count);
        debug!(target: "folio::test", "debug {}", count);
        info!("info");
        warn!(target: "folio::test", "warn");
        error!("error {count}");
    }
}
