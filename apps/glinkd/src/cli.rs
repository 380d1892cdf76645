// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line interface for the glinkd server.

use clap::Parser;

/// Gibberlink protocol gateway daemon.
#[derive(Debug, Parser)]
#[command(name = "glinkd", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the listen port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_flags() {
        let cli = Cli::parse_from(["glinkd", "--config", "glinkd.toml", "--port", "9001"]);
        assert_eq!(cli.config.as_deref(), Some("glinkd.toml"));
        assert_eq!(cli.port, Some(9001));
        assert!(!cli.print_config);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["glinkd"]);
        assert!(cli.config.is_none());
        assert!(cli.port.is_none());
    }
}
