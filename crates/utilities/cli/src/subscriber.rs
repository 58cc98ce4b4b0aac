//! Tracing subscriber setup.

use crate::{CliError, CliResult};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Maps a `-v` count to the most verbose level that is logged.
///
/// No flag logs errors only; each `-v` adds a level, up to `TRACE`.
pub const fn verbosity_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global `tracing` subscriber.
///
/// Without an explicit `env_filter`, `RUST_LOG` directives apply on top of the level chosen by
/// `verbosity`.
pub fn init_tracing_subscriber(
    verbosity: u8,
    env_filter: Option<impl Into<EnvFilter>>,
) -> CliResult<()> {
    let filter = match env_filter {
        Some(filter) => filter.into(),
        None => EnvFilter::builder()
            .with_default_directive(verbosity_level(verbosity).into())
            .from_env_lossy(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| CliError::Tracing(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Level::ERROR)]
    #[case(1, Level::WARN)]
    #[case(2, Level::INFO)]
    #[case(3, Level::DEBUG)]
    #[case(4, Level::TRACE)]
    #[case(9, Level::TRACE)]
    fn test_verbosity_level(#[case] verbosity: u8, #[case] level: Level) {
        assert_eq!(verbosity_level(verbosity), level);
    }
}
