//! Structured logging bootstrap.
//!
//! Every crate logs through `tracing` macros with structured fields. Binaries
//! call [`init_subscriber`] once at startup; libraries never install a
//! subscriber themselves.

use tracing_subscriber::EnvFilter;

/// Line format of the stderr log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single lines with targets.
    #[default]
    Compact,
    /// One JSON object per event, for log shipping.
    Json,
}

/// Install the global subscriber writing `format` lines to stderr.
///
/// `RUST_LOG` wins over `level` when set. Only the first call installs
/// anything; later calls return `false`.
pub fn init_subscriber(level: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => builder.with_target(true).compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_installs_are_no_ops() {
        let _ = init_subscriber("warn", LogFormat::Compact);
        assert!(!init_subscriber("debug", LogFormat::Json));
        assert!(!init_subscriber("info", LogFormat::Compact));
    }

    #[test]
    fn compact_is_the_default_format() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }
}
