//! piper: pipeline step runner.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse global flags and the sub-command
//!   3. Load project config (default configs, then custom config)
//!   4. Init logger once (`--verbose` or `[general] verbose` → debug)
//!   5. Run the step, or print config / generate docs

use clap::Parser;
use serde_json::Map;
use tracing::info;

use piper::cli::{Cli, Command};
use piper::docs;
use piper::error::AppError;
use piper::logger::{self, SecretMask};
use piper::metadata::StepData;
use piper::steps::{self, StepContext, python_build};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut general = cli.general.into_config();
    general.ensure_correlation_id();

    let project = general.load_project()?;
    general.verbose |= project.verbose();

    let mask = SecretMask::new();
    logger::init(logger::level_for(general.verbose), general.verbose, mask.clone())?;

    info!(
        correlation_id = %general.correlation_id,
        custom_config = %general.custom_config.display(),
        stage = general.stage_name.as_deref().unwrap_or("-"),
        "config loaded"
    );

    let ctx = StepContext { general: &general, project: &project, mask: &mask };

    match cli.command {
        Command::PythonBuild(flags) => python_build::run(&ctx, &flags),
        Command::GetConfig { step_name } => {
            let metadata = steps::find_metadata(&step_name)
                .ok_or_else(|| AppError::Config(format!("unknown step '{step_name}'")))?;
            let resolved = steps::resolve_config(&ctx, &metadata, Map::new())?;
            let rendered = serde_json::to_string_pretty(&resolved.to_json())
                .map_err(|e| AppError::Config(format!("cannot render config: {e}")))?;
            println!("{rendered}");
            Ok(())
        }
        Command::Docs { step, metadata, out } => {
            let selected: Vec<StepData> = if !metadata.is_empty() {
                metadata.iter().map(|p| StepData::load(p)).collect::<Result<_, _>>()?
            } else if let Some(name) = step {
                vec![steps::find_metadata(&name)
                    .ok_or_else(|| AppError::Docs(format!("unknown step '{name}'")))?]
            } else {
                steps::all_metadata()
            };
            let written = docs::write_step_docs(&selected, &out)?;
            println!("✓ {} step page(s) written to {}", written.len(), out.display());
            Ok(())
        }
    }
}
