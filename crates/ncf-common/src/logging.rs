use std::panic;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

const LOG_DIR_ENV: &str = "NCF_LOG_DIR";
const BACKTRACE_ENV: &str = "NCF_LOG_INCLUDE_BACKTRACE";
const DEFAULT_FILTER: &str = "info";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where logs go and how panics are reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// Daily-rotated `<dir>/<app>.log` instead of stdout.
    pub dir: Option<PathBuf>,
    /// Also run the default panic hook, which prints the backtrace.
    pub include_backtrace: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let include_backtrace = lookup(BACKTRACE_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            dir: lookup(LOG_DIR_ENV)
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            include_backtrace,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic payload not string".into())
}

fn install_panic_hook(app_name: &'static str, include_backtrace: bool) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();

        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

            tracing::error!(
                application = app_name,
                thread_name = std::thread::current().name().unwrap_or("unknown"),
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %panic_message(info.payload()),
                "panic captured"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

fn file_writer(app_name: &'static str, dir: &Path) -> std::io::Result<BoxMakeWriter> {
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Ok(BoxMakeWriter::new(non_blocking))
}

/// Install the global subscriber (`RUST_LOG`, default `info`) and route panics
/// through `tracing`, both configured from `NCF_LOG_*`.
pub fn init_tracing(app_name: &'static str) {
    let settings = LogSettings::from_env();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    let writer = settings
        .dir
        .as_ref()
        .map(|dir| file_writer(app_name, dir.as_path()));
    match writer {
        Some(Ok(writer)) => {
            let _ = builder.with_writer(writer).try_init();
        }
        Some(Err(err)) => {
            let _ = builder.try_init();
            tracing::warn!(error = %err, "cannot create {LOG_DIR_ENV}; logging to stdout");
        }
        None => {
            let _ = builder.try_init();
        }
    }

    install_panic_hook(app_name, settings.include_backtrace);
    tracing::debug!(?settings, "tracing initialized");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_stdout_without_backtraces() {
        assert_eq!(settings(&[]), LogSettings::default());
    }

    #[test]
    fn reads_directory_and_backtrace_flag() {
        let parsed = settings(&[(LOG_DIR_ENV, "/var/log/ncf"), (BACKTRACE_ENV, "TRUE")]);

        assert_eq!(parsed.dir, Some(PathBuf::from("/var/log/ncf")));
        assert!(parsed.include_backtrace);
    }

    #[test]
    fn blank_directory_is_ignored() {
        let parsed = settings(&[(LOG_DIR_ENV, "  "), (BACKTRACE_ENV, "no")]);
        assert_eq!(parsed, LogSettings::default());
    }

    #[test]
    fn file_writer_creates_missing_directories() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("logs");

        assert!(file_writer("ncf-test", &dir).is_ok());
        assert!(dir.is_dir());
    }

    #[test]
    fn extracts_str_and_string_payloads() {
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn std::any::Any + Send> = Box::new(42u8);

        assert_eq!(panic_message(borrowed.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "panic payload not string");
    }
}
