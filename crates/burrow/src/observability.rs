use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::Level;
use tracing_subscriber::prelude::*;

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";
const LOG_LEVEL_ENV: &str = "BURROW_LOG_LEVEL";
const USE_JOURNALD_ENV: &str = "BURROW_USE_JOURNALD";

enum LogFormat {
    Text,
    Json,
}

/// If in debug mode, default level is debug to get maximum logging
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";

/// Release builds only report warnings and errors unless asked otherwise
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "warn";

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {}", unknown),
    }
}

// `--debug` wins over the environment, which wins over the build default.
fn detect_log_level(input: Option<String>, is_debug: bool) -> Result<Level> {
    let log_level: Cow<str> = match input {
        _ if is_debug => "debug".into(),
        Some(level) => level.into(),
        None => DEFAULT_LOG_LEVEL.into(),
    };

    Ok(Level::from_str(log_level.as_ref())?)
}

#[derive(Debug, Default)]
pub struct ObservabilityConfig {
    pub log_debug_flag: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
    pub systemd_log: bool,
}

impl From<&crate::Opts> for ObservabilityConfig {
    fn from(opts: &crate::Opts) -> Self {
        Self {
            log_debug_flag: opts.global.debug,
            log_level: std::env::var(LOG_LEVEL_ENV).ok(),
            log_file: opts.global.log.to_owned(),
            log_format: opts.global.log_format.to_owned(),
            systemd_log: std::env::var_os(USE_JOURNALD_ENV).is_some(),
        }
    }
}

pub fn init<T>(config: T) -> Result<()>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = detect_log_level(config.log_level, config.log_debug_flag)
        .with_context(|| "failed to parse log level")?;
    let log_level_filter = tracing_subscriber::filter::LevelFilter::from(level);
    let log_format = detect_log_format(config.log_format.as_deref())
        .with_context(|| "failed to detect log format")?;

    let systemd_journald = if config.systemd_log {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer.with_syslog_identifier("burrow".to_string())),
            Err(err) => {
                // journald is unreachable inside most nested setups
                eprintln!("failed to initialize journald logging: {:?}", err);
                None
            }
        }
    } else {
        None
    };
    let subscriber = tracing_subscriber::registry()
        .with(log_level_filter)
        .with(systemd_journald);

    // The fmt layer type differs per writer and format, so each
    // combination gets its own branch.
    match (config.log_file.as_ref(), log_format) {
        (None, LogFormat::Text) => {
            subscriber
                .with(
                    tracing_subscriber::fmt::layer()
                        .without_time()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;
        }
        (None, LogFormat::Json) => {
            subscriber
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;
        }
        (Some(path), LogFormat::Text) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            subscriber
                .with(tracing_subscriber::fmt::layer().with_writer(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;
        }
        (Some(path), LogFormat::Json) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            subscriber
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_span_list(false)
                        .with_writer(file),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};

    use super::*;

    // A global subscriber can only be installed once per process, so each
    // init test runs in a forked child and reports through its exit code.
    fn in_child_process<F: FnOnce() -> Result<()>>(cb: F) -> Result<()> {
        // SAFETY: the child only runs the callback and exits
        match unsafe { fork()? } {
            ForkResult::Child => {
                let code = match cb() {
                    Ok(()) => 0,
                    Err(err) => {
                        eprintln!("child failed: {err:?}");
                        1
                    }
                };
                std::process::exit(code);
            }
            ForkResult::Parent { child } => match waitpid(child, None)? {
                WaitStatus::Exited(_, 0) => Ok(()),
                status => bail!("child process failed: {status:?}"),
            },
        }
    }

    #[test]
    fn test_detect_log_level() {
        let test = vec![
            ("error", tracing::Level::ERROR),
            ("warn", tracing::Level::WARN),
            ("info", tracing::Level::INFO),
            ("debug", tracing::Level::DEBUG),
            ("trace", tracing::Level::TRACE),
        ];
        for (input, expected) in test {
            assert_eq!(
                detect_log_level(Some(input.to_string()), false)
                    .expect("failed to parse log level"),
                expected
            )
        }
        assert_eq!(
            detect_log_level(None, true).expect("failed to parse log level"),
            tracing::Level::DEBUG
        );
        assert!(detect_log_level(Some("invalid".to_string()), false).is_err());
    }

    #[test]
    fn test_debug_flag_overrides_env_level() {
        assert_eq!(
            detect_log_level(Some("error".to_string()), true).unwrap(),
            tracing::Level::DEBUG
        );
    }

    #[test]
    fn test_detect_log_level_default() {
        let expected = if cfg!(debug_assertions) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };
        assert_eq!(detect_log_level(None, false).unwrap(), expected);
    }

    #[test]
    fn test_unknown_log_format() {
        assert!(detect_log_format(Some("xml")).is_err());
        let config = ObservabilityConfig {
            log_format: Some("xml".to_owned()),
            ..Default::default()
        };
        assert!(init(config).is_err());
    }

    #[test]
    fn test_higher_loglevel_no_log() -> Result<()> {
        in_child_process(|| {
            let temp_dir = tempfile::tempdir()?;
            let log_file = Path::join(temp_dir.path(), "test.log");
            let config = ObservabilityConfig {
                log_file: Some(log_file.clone()),
                log_level: Some("error".to_string()),
                ..Default::default()
            };
            init(config)?;
            assert_eq!(log_file.metadata()?.len(), 0, "a new logfile should be empty");
            tracing::info!("testing this");
            let data = std::fs::read_to_string(&log_file)?;
            if !data.is_empty() {
                bail!("info level should not be logged, but got: {data}");
            }
            Ok(())
        })
    }

    #[test]
    fn test_json_logfile_appends() -> Result<()> {
        in_child_process(|| {
            let temp_dir = tempfile::tempdir()?;
            let log_file = Path::join(temp_dir.path(), "test.log");
            std::fs::write(&log_file, "{\"msg\":\"earlier\"}\n")?;
            let config = ObservabilityConfig {
                log_file: Some(log_file.clone()),
                log_format: Some(LOG_FORMAT_JSON.to_owned()),
                ..Default::default()
            };
            init(config)?;
            tracing::error!("testing json log");
            let data = std::fs::read_to_string(&log_file)?;
            let lines: Vec<&str> = data.lines().collect();
            if lines.len() != 2 {
                bail!("expected the earlier line to be kept, got: {data}");
            }
            for line in lines {
                serde_json::from_str::<serde_json::Value>(line)
                    .with_context(|| format!("failed to parse {line}"))?;
            }
            Ok(())
        })
    }
}
