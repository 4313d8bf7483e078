//! Logging for seisrisk, built on `fern`.
//!
//! Progress messages go to stdout and warnings and errors to stderr, coloured on terminals. When
//! an output folder is given, the same messages are also written to two log files in it.
use anyhow::{Context, Result, bail};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

/// A flag indicating whether the logger has been initialised
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The log level used when neither the environment nor `settings.toml` sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable overriding the log level
const LOG_LEVEL_ENV_VAR: &str = "SEISRISK_LOG_LEVEL";

/// Log file for progress messages
const LOG_INFO_FILE_NAME: &str = "seisrisk_info.log";

/// Log file for warnings and errors, such as data-quality problems of the exposure
const LOG_ERROR_FILE_NAME: &str = "seisrisk_error.log";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Initialise the program logger.
///
/// The level is taken from the `SEISRISK_LOG_LEVEL` environment variable, else from
/// `log_level_from_settings`, else [`DEFAULT_LOG_LEVEL`]. Accepted names are `off`, `error`,
/// `warn`, `info`, `debug` and `trace`, in any case.
///
/// If `log_dir` is given, `seisrisk_info.log` and `seisrisk_error.log` are (re)created in it.
/// Fails if the logger has already been initialised.
pub fn init(log_level_from_settings: Option<&str>, log_dir: Option<&Path>) -> Result<()> {
    let from_env = env::var(LOG_LEVEL_ENV_VAR).ok();
    let log_level = resolve_log_level(from_env.as_deref(), log_level_from_settings)?;

    let mut dispatch = terminal_dispatch(log_level);
    if let Some(log_dir) = log_dir {
        dispatch = dispatch.chain(file_dispatch(log_dir, log_level)?);
    }

    dispatch.apply().context("Logger already initialised")?;
    let _ = LOGGER_INIT.set(());

    Ok(())
}

/// Choose the log level from the environment, the settings or the default, in that order
fn resolve_log_level(from_env: Option<&str>, from_settings: Option<&str>) -> Result<LevelFilter> {
    match (from_env, from_settings) {
        (Some(name), _) => {
            parse_log_level(name).with_context(|| format!("Invalid {LOG_LEVEL_ENV_VAR}"))
        }
        (None, Some(name)) => {
            parse_log_level(name).context("Invalid log_level in settings.toml")
        }
        (None, None) => parse_log_level(DEFAULT_LOG_LEVEL),
    }
}

/// Convert a log level name to a [`LevelFilter`], ignoring case
pub fn parse_log_level(log_level: &str) -> Result<LevelFilter> {
    let level = match log_level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        unknown => bail!("Unknown log level: {unknown}"),
    };

    Ok(level)
}

/// Messages up to `info` (or finer, if requested) on stdout and warnings on stderr
fn terminal_dispatch(log_level: LevelFilter) -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let colour_stdout = std::io::stdout().is_terminal();
    let colour_stderr = std::io::stderr().is_terminal();

    Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(move |out, message, record| {
                    write_log_colour(out, message, record, colour_stdout.then_some(&colours));
                })
                .level(log_level)
                .chain(std::io::stdout()),
        )
        .chain(
            Dispatch::new()
                .format(move |out, message, record| {
                    write_log_colour(out, message, record, colour_stderr.then_some(&colours));
                })
                .level(log_level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        )
}

fn create_log_file(log_dir: &Path, file_name: &str) -> Result<File> {
    let file_path = log_dir.join(file_name);
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&file_path)
        .with_context(|| format!("Could not create log file {}", file_path.display()))
}

/// Plain-text log files in `log_dir`. The info file records at least `info` messages whatever
/// the terminal level, the error file records every warning.
fn file_dispatch(log_dir: &Path, log_level: LevelFilter) -> Result<Dispatch> {
    let info_file = create_log_file(log_dir, LOG_INFO_FILE_NAME)?;
    let error_file = create_log_file(log_dir, LOG_ERROR_FILE_NAME)?;

    Ok(Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(write_log_plain)
                .level(log_level.max(LevelFilter::Info))
                .chain(info_file),
        )
        .chain(
            Dispatch::new()
                .format(write_log_plain)
                .level(LevelFilter::Warn)
                .chain(error_file),
        ))
}

/// Write a log line as `[time level target] message`, dropping the crate name from the target
fn write_log<T: Display>(out: FormatCallback, level: T, target: &str, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");
    let target = target.strip_prefix("seisrisk::").unwrap_or(target);

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}

fn write_log_plain(out: FormatCallback, message: &Arguments, record: &Record) {
    write_log(out, record.level(), record.target(), message);
}

fn write_log_colour(
    out: FormatCallback,
    message: &Arguments,
    record: &Record,
    colours: Option<&ColoredLevelConfig>,
) {
    match colours {
        Some(colours) => write_log(out, colours.color(record.level()), record.target(), message),
        None => write_log_plain(out, message, record),
    }
}
