//! Command-line surface: global flags shared by all steps and one
//! sub-command per step or tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::GeneralConfig;
use crate::steps::python_build::{self, PythonBuildFlags};

#[derive(Debug, Parser)]
#[command(name = "piper", version, about = "Pipeline step runner and step documentation generator")]
pub struct Cli {
    #[command(flatten)]
    pub general: GeneralArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GeneralArgs {
    /// Activates debug output.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// ID for unique identification of a pipeline run.
    #[arg(long = "correlationID", global = true, env = "PIPER_correlationID", default_value = "")]
    pub correlation_id: String,

    /// Root path of the Common Pipeline Environment.
    #[arg(long = "envRootPath", global = true, default_value = ".pipeline")]
    pub env_root_path: PathBuf,

    /// Path to the project configuration file.
    #[arg(long = "customConfig", global = true, default_value = ".pipeline/config.toml")]
    pub custom_config: PathBuf,

    /// Default configuration files, merged in the given order below the custom config.
    #[arg(long = "defaultConfig", global = true)]
    pub default_config: Vec<PathBuf>,

    /// Name of the pipeline stage the step runs in.
    #[arg(long = "stageName", global = true, env = "STAGE_NAME")]
    pub stage_name: Option<String>,

    /// Disables step telemetry reporting.
    #[arg(long = "noTelemetry", global = true)]
    pub no_telemetry: bool,
}

impl GeneralArgs {
    pub fn into_config(self) -> GeneralConfig {
        GeneralConfig {
            verbose: self.verbose,
            correlation_id: self.correlation_id,
            env_root_path: self.env_root_path,
            custom_config: self.custom_config,
            default_config: self.default_config,
            stage_name: self.stage_name.filter(|s| !s.is_empty()),
            no_telemetry: self.no_telemetry,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Step builds a python project.
    #[command(name = "pythonBuild", long_about = python_build::LONG_DESCRIPTION)]
    PythonBuild(PythonBuildFlags),

    /// Print the resolved configuration of a step as JSON.
    #[command(name = "getConfig")]
    GetConfig {
        #[arg(long = "stepName")]
        step_name: String,
    },

    /// Generate markdown documentation for steps.
    #[command(name = "docs")]
    Docs {
        /// Only document this built-in step.
        #[arg(long)]
        step: Option<String>,
        /// Step metadata files (TOML) to document instead of the built-in steps.
        #[arg(long)]
        metadata: Vec<PathBuf>,
        /// Output directory for the generated pages.
        #[arg(long, default_value = "docs/steps")]
        out: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["piper"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn python_build_with_global_flags() {
        let cli = parse(&["pythonBuild", "--verbose", "--createBOM", "--envRootPath", "/tmp/env"]);
        assert!(cli.general.verbose);
        assert_eq!(cli.general.env_root_path, PathBuf::from("/tmp/env"));
        match cli.command {
            Command::PythonBuild(flags) => assert_eq!(flags.create_bom, Some(true)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn default_config_is_repeatable() {
        let cli = parse(&["--defaultConfig", "a.toml", "--defaultConfig", "b.toml", "getConfig", "--stepName", "pythonBuild"]);
        let general = cli.general.into_config();
        assert_eq!(general.default_config, vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]);
        assert_eq!(general.custom_config, PathBuf::from(".pipeline/config.toml"));
    }

    #[test]
    fn docs_defaults() {
        match parse(&["docs"]).command {
            Command::Docs { step, metadata, out } => {
                assert!(step.is_none());
                assert!(metadata.is_empty());
                assert_eq!(out, PathBuf::from("docs/steps"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["piper", "mavenBuild"]).is_err());
    }
}
