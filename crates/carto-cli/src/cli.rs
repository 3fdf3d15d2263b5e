use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "cartod",
    about = "carto — persistent geospatial key-value store over REST",
    version,
)]
pub struct Cli {
    /// Path to the TOML configuration file. Built-in defaults apply when
    /// omitted (volatile store listening on 0.0.0.0:4269).
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare() {
        let cli = Cli::try_parse_from(["cartod"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_config_path() {
        let cli = Cli::try_parse_from(["cartod", "/etc/carto.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/carto.toml")));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["cartod", "-v", "/etc/carto.toml"]).unwrap();
        assert!(cli.verbose);
    }
}
