//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "container-tags")]
#[command(about = "List the tags of container images on Docker Hub, GHCR, Quay and ECR")]
#[command(version)]
pub struct Args {
    /// Image references, as passed to `docker pull` (without a tag)
    #[arg(required = true, value_name = "REFERENCE")]
    pub references: Vec<String>,

    /// Configuration file path
    #[arg(
        long = "config",
        short = 'c',
        help = "Path to a JSON configuration file (defaults to $CONTAINER_TAGS_CONFIG)"
    )]
    pub config: Option<PathBuf>,

    /// Print tag objects as JSON
    #[arg(long = "json", help = "Print a JSON array of tag objects per reference")]
    pub json: bool,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable debug logging")]
    pub verbose: bool,

    /// Overall deadline in seconds
    #[arg(
        long = "timeout",
        short = 't',
        help = "Give up after this many seconds (overrides timeout_secs in the config)"
    )]
    pub timeout: Option<u64>,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout == Some(0) {
            return Err("Timeout must be greater than 0".to_string());
        }
        if let Some(empty) = self.references.iter().position(|r| r.trim().is_empty()) {
            return Err(format!("Reference #{} is empty", empty + 1));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_references() {
        let args = Args::try_parse_from([
            "container-tags",
            "--json",
            "-t",
            "30",
            "--config",
            "tags.json",
            "ghcr.io/org/app",
            "ubuntu",
        ])
        .unwrap();

        assert!(args.json);
        assert!(!args.verbose);
        assert_eq!(args.timeout, Some(30));
        assert_eq!(args.config, Some(PathBuf::from("tags.json")));
        assert_eq!(args.references, ["ghcr.io/org/app", "ubuntu"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn requires_a_reference() {
        assert!(Args::try_parse_from(["container-tags", "--json"]).is_err());
    }

    #[test]
    fn rejects_zero_timeout_and_blank_references() {
        let args = Args::try_parse_from(["container-tags", "--timeout", "0", "ubuntu"]).unwrap();
        assert!(args.validate().is_err());

        let args = Args::try_parse_from(["container-tags", "ubuntu", " "]).unwrap();
        assert_eq!(args.validate().unwrap_err(), "Reference #2 is empty");
    }
}
