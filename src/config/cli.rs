use crate::domain::model::RawParamSet;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, Validate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "psl-stitch")]
#[command(about = "Create linked simulations across the PSL apps on Compute Studio")]
pub struct CliConfig {
    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    #[command(about = "Run the HTTP API")]
    Serve(ServeArgs),
    #[command(about = "Create one set of linked simulations and print the result as JSON")]
    Create(CreateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, help = "TOML settings file; environment variables are used when omitted")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    #[arg(long, env = "CS_API_TOKEN", help = "Compute Studio bearer token")]
    pub token: String,

    #[arg(long, help = "Tax-Calculator policy reform (JSON file or inline JSON)")]
    pub policy: Option<String>,

    #[arg(long, help = "Tax-Cruncher inputs (JSON file or inline JSON)")]
    pub taxcrunch: Option<String>,

    #[arg(long, help = "Cost-of-Capital-Calculator inputs (JSON file or inline JSON)")]
    pub ccc: Option<String>,

    #[arg(long, help = "Behavioral response inputs (JSON file or inline JSON)")]
    pub behavior: Option<String>,

    #[arg(long, default_value = "https://compute.studio")]
    pub cs_base_url: String,

    #[arg(long, default_value = "2021")]
    pub year: u32,

    #[arg(long, help = "Wait until every simulation has finished")]
    pub wait: bool,

    #[arg(long, default_value = "10")]
    pub poll_interval: u64,

    #[arg(long, default_value = "1800", help = "Give up waiting after this many seconds")]
    pub wait_timeout: u64,
}

impl CreateArgs {
    pub fn raw_params(&self) -> RawParamSet {
        RawParamSet {
            policy_params: self.policy.clone(),
            taxcrunch_params: self.taxcrunch.clone(),
            ccc_params: self.ccc.clone(),
            behavior_params: self.behavior.clone(),
        }
    }
}

impl Validate for CreateArgs {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("token", &self.token)?;
        crate::utils::validation::validate_url("cs_base_url", &self.cs_base_url)?;
        validate_positive_number("poll_interval", self.poll_interval, 1)?;
        validate_positive_number("wait_timeout", self.wait_timeout, 1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_command() {
        let config = CliConfig::try_parse_from([
            "psl-stitch",
            "create",
            "--token",
            "abc",
            "--policy",
            "reform.json",
            "--wait",
            "--poll-interval",
            "3",
        ])
        .unwrap();

        match config.command {
            Command::Create(args) => {
                assert_eq!(args.token, "abc");
                assert!(args.wait);
                assert_eq!(args.poll_interval, 3);
                let raw = args.raw_params();
                assert_eq!(raw.policy_params.as_deref(), Some("reform.json"));
                assert!(raw.ccc_params.is_none());
                assert!(args.validate().is_ok());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_serve_command() {
        let config =
            CliConfig::try_parse_from(["psl-stitch", "serve", "--json-logs", "--verbose"]).unwrap();
        assert!(config.verbose);
        match config.command {
            Command::Serve(args) => {
                assert!(args.json_logs);
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let config = CliConfig::try_parse_from([
            "psl-stitch",
            "create",
            "--token",
            "abc",
            "--poll-interval",
            "0",
        ])
        .unwrap();
        let Command::Create(args) = config.command else {
            panic!("expected create");
        };
        assert!(args.validate().is_err());
    }
}
