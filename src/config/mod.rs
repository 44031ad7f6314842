//! Configuration: global run settings, project config files and per-step
//! parameter resolution.

mod load;
mod resolve;

use std::path::PathBuf;

pub use load::{ProjectConfig, load_project_config, merge_toml};
pub use resolve::{ResolveInput, StepConfig, resolve, validate};

/// Settings shared by every step, taken from the global command-line flags.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub verbose: bool,
    /// Identifies one pipeline run across steps and telemetry events.
    pub correlation_id: String,
    /// Root directory of the Common Pipeline Environment.
    pub env_root_path: PathBuf,
    pub custom_config: PathBuf,
    pub default_config: Vec<PathBuf>,
    pub stage_name: Option<String>,
    pub no_telemetry: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            correlation_id: String::new(),
            env_root_path: PathBuf::from(".pipeline"),
            custom_config: PathBuf::from(".pipeline/config.toml"),
            default_config: Vec::new(),
            stage_name: None,
            no_telemetry: false,
        }
    }
}

impl GeneralConfig {
    /// Fill in a fresh correlation id when none was passed.
    pub fn ensure_correlation_id(&mut self) {
        if self.correlation_id.is_empty() {
            self.correlation_id = uuid::Uuid::new_v4().to_string();
        }
    }

    pub fn load_project(&self) -> Result<ProjectConfig, crate::error::AppError> {
        load_project_config(&self.default_config, &self.custom_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_pipeline_dir() {
        let cfg = GeneralConfig::default();
        assert_eq!(cfg.env_root_path, PathBuf::from(".pipeline"));
        assert_eq!(cfg.custom_config, PathBuf::from(".pipeline/config.toml"));
    }

    #[test]
    fn correlation_id_generated_once() {
        let mut cfg = GeneralConfig::default();
        cfg.ensure_correlation_id();
        let first = cfg.correlation_id.clone();
        assert!(!first.is_empty());
        cfg.ensure_correlation_id();
        assert_eq!(cfg.correlation_id, first);
    }

    #[test]
    fn explicit_correlation_id_kept() {
        let mut cfg = GeneralConfig { correlation_id: "run-42".into(), ..GeneralConfig::default() };
        cfg.ensure_correlation_id();
        assert_eq!(cfg.correlation_id, "run-42");
    }
}
