//! Logging setup.
//!
//! Unified `tracing` initialization driven by [`LoggingConfig`]: level and
//! per-module filters through `EnvFilter` (a set `RUST_LOG` still wins),
//! compact/full/pretty formats, stdout/stderr/file outputs.

use std::ffi::OsStr;
use std::path::Path;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LogOutput, LoggingConfig};

/// Initializes logging from configuration. Safe to call more than once;
/// later calls are no-ops.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = try_init(config);
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    for (module, level) in &config.filters {
        if let Ok(directive) = format!("{}={}", module, level.as_str()).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Attempts to initialize the global subscriber, returning an error when
/// one is already set.
pub fn try_init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = build_filter(config);

    macro_rules! init_with_writer {
        ($writer:expr) => {
            match config.format {
                LogFormat::Compact => tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .compact()
                            .with_thread_ids(config.thread_ids)
                            .with_file(config.file_location)
                            .with_line_number(config.file_location)
                            .with_writer($writer),
                    )
                    .with(filter)
                    .try_init(),
                LogFormat::Full => tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_thread_ids(config.thread_ids)
                            .with_file(config.file_location)
                            .with_line_number(config.file_location)
                            .with_writer($writer),
                    )
                    .with(filter)
                    .try_init(),
                LogFormat::Pretty => tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .pretty()
                            .with_thread_ids(config.thread_ids)
                            .with_file(config.file_location)
                            .with_line_number(config.file_location)
                            .with_writer($writer),
                    )
                    .with(filter)
                    .try_init(),
            }
        };
    }

    match config.output {
        LogOutput::Stdout => init_with_writer!(std::io::stdout),
        LogOutput::Stderr => init_with_writer!(std::io::stderr),
        LogOutput::File => match &config.file_path {
            Some(path) => {
                let appender = tracing_appender::rolling::never(
                    path.parent().unwrap_or_else(|| Path::new(".")),
                    path.file_name().unwrap_or_else(|| OsStr::new("ovation.log")),
                );
                init_with_writer!(appender)
            }
            None => {
                eprintln!("File log output requested without a file path, using stdout");
                init_with_writer!(std::io::stdout)
            }
        },
    }
}
