//! Pipeline steps and the config plumbing every step shares.

pub mod python_build;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::{self, GeneralConfig, ProjectConfig, ResolveInput, StepConfig};
use crate::error::AppError;
use crate::logger::SecretMask;
use crate::metadata::StepData;

/// Run-wide state handed to each step.
pub struct StepContext<'a> {
    pub general: &'a GeneralConfig,
    pub project: &'a ProjectConfig,
    pub mask: &'a SecretMask,
}

/// Metadata of every built-in step.
pub fn all_metadata() -> Vec<StepData> {
    vec![python_build::metadata()]
}

pub fn find_metadata(name: &str) -> Option<StepData> {
    all_metadata().into_iter().find(|step| {
        step.name() == name || step.metadata.aliases.iter().any(|a| a.name == name)
    })
}

/// `PIPER_<name>` values for parameters without a metadata default. Unset
/// variables are left out.
pub fn env_defaults(metadata: &StepData) -> Map<String, Value> {
    metadata
        .parameters()
        .iter()
        .filter(|p| p.default.is_none())
        .filter_map(|p| {
            std::env::var(format!("PIPER_{}", p.name))
                .ok()
                .map(|v| (p.name.clone(), Value::String(v)))
        })
        .collect()
}

/// Resolve a step's configuration without validating it.
pub fn resolve_config(
    ctx: &StepContext<'_>,
    metadata: &StepData,
    flags: Map<String, Value>,
) -> Result<StepConfig, AppError> {
    config::resolve(ResolveInput {
        metadata,
        project: ctx.project,
        stage_name: ctx.general.stage_name.as_deref(),
        env_root: &ctx.general.env_root_path,
        env_defaults: env_defaults(metadata),
        flags,
    })
}

/// Resolve, register secrets with the log mask, validate and deserialize
/// into the step's options type.
pub fn prepare_config<O: DeserializeOwned>(
    ctx: &StepContext<'_>,
    metadata: &StepData,
    flags: Map<String, Value>,
) -> Result<O, AppError> {
    let resolved = resolve_config(ctx, metadata, flags)?;

    for param in metadata.parameters().iter().filter(|p| p.secret) {
        if let Some(Value::String(secret)) = resolved.get(&param.name) {
            ctx.mask.register(secret);
        }
    }

    config::validate(metadata, &resolved)?;
    tracing::debug!(config = %ctx.mask.apply(&resolved.to_json().to_string()), "step configuration resolved");
    resolved.into_options()
}
