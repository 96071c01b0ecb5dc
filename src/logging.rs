use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Initialise logging. With `debug` off the level is forced to `info`, even if
/// `RUST_LOG` is set; with `debug` on `RUST_LOG` may override the `debug`
/// default. When `log_file` is given, events go to that file instead of stderr.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let file_appender = log_file.and_then(|path| {
        let file_name = path.file_name()?.to_owned();
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Some(tracing_appender::rolling::never(dir, file_name))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match file_appender {
        Some(appender) => builder.with_ansi(false).with_writer(appender).try_init(),
        None => builder.try_init(),
    };
}
