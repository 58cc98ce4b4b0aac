//! Logging arguments shared by every command.

use clap::{ArgAction, Args};

/// Logging arguments.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LogArgs {
    /// Verbosity level: `-v` warnings, `-vv` info, `-vvv` debug, `-vvvv` trace.
    #[arg(short = 'v', long = "verbosity", action = ArgAction::Count, global = true, default_value = "2")]
    pub level: u8,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self { level: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        log: LogArgs,
    }

    #[test]
    fn test_default_level_is_info() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.log, LogArgs::default());
    }

    #[test]
    fn test_flags_count() {
        let cli = TestCli::parse_from(["test", "-vvvv"]);
        assert_eq!(cli.log.level, 4);
    }
}
