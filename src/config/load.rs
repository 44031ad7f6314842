//! Project configuration loading.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains, and
//! deep-merges the default config files and the custom config in order.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Deep-merge two TOML values.
/// Tables are merged recursively; the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Merged project configuration with `[general]`, `[steps.*]` and
/// `[stages.*]` sections.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    root: toml::Value,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { root: toml::Value::Table(toml::Table::new()) }
    }
}

impl ProjectConfig {
    pub fn from_value(root: toml::Value) -> Self {
        Self { root }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let root = toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
        Ok(Self { root })
    }

    pub fn general(&self) -> Option<&toml::Table> {
        self.root.get("general").and_then(|v| v.as_table())
    }

    pub fn step(&self, name: &str) -> Option<&toml::Table> {
        self.root
            .get("steps")
            .and_then(|s| s.get(name))
            .and_then(|v| v.as_table())
    }

    pub fn stage(&self, name: &str) -> Option<&toml::Table> {
        self.root
            .get("stages")
            .and_then(|s| s.get(name))
            .and_then(|v| v.as_table())
    }

    /// `verbose = true` in `[general]`.
    pub fn verbose(&self) -> bool {
        self.general()
            .and_then(|g| g.get("verbose"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Merge `defaults` in order, then `custom` on top. Every default file must
/// exist; a missing custom file is skipped.
pub fn load_project_config(defaults: &[PathBuf], custom: &Path) -> Result<ProjectConfig, AppError> {
    let mut merged = toml::Value::Table(toml::Table::new());

    for path in defaults {
        let val = load_raw_merged(path, &mut HashSet::new())?;
        merged = merge_toml(merged, val);
    }

    if custom.exists() {
        let val = load_raw_merged(custom, &mut HashSet::new())?;
        merged = merge_toml(merged, val);
    } else {
        tracing::debug!(path = %custom.display(), "custom config not found, using defaults only");
    }

    Ok(ProjectConfig::from_value(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn merge_replaces_scalars_and_merges_tables() {
        let base: toml::Value = toml::from_str("[general]\na = 1\nb = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[general]\nb = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["general"]["a"].as_integer(), Some(1));
        assert_eq!(merged["general"]["b"].as_integer(), Some(3));
    }

    #[test]
    fn custom_overrides_defaults() {
        let defaults = write_toml("[steps.pythonBuild]\npublish = false\ncreateBOM = true\n");
        let custom = write_toml("[steps.pythonBuild]\npublish = true\n");
        let cfg = load_project_config(&[defaults.path().to_path_buf()], custom.path()).unwrap();
        let step = cfg.step("pythonBuild").unwrap();
        assert_eq!(step["publish"].as_bool(), Some(true));
        assert_eq!(step["createBOM"].as_bool(), Some(true));
    }

    #[test]
    fn missing_custom_config_is_fine() {
        let dir = TempDir::new().unwrap();
        let cfg = load_project_config(&[], &dir.path().join("config.toml")).unwrap();
        assert!(cfg.general().is_none());
        assert!(!cfg.verbose());
    }

    #[test]
    fn missing_default_config_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("defaults.toml");
        let err = load_project_config(&[missing], &dir.path().join("config.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn base_chain_is_followed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.toml"), "[general]\nverbose = true\n").unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "[meta]\nbase = \"base.toml\"\n[stages.Build]\npublish = true\n",
        )
        .unwrap();
        let cfg = load_project_config(&[], &dir.path().join("config.toml")).unwrap();
        assert!(cfg.verbose());
        assert!(cfg.stage("Build").is_some());
    }

    #[test]
    fn circular_base_detected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), "[meta]\nbase = \"b.toml\"\n").unwrap();
        fs::write(dir.path().join("b.toml"), "[meta]\nbase = \"a.toml\"\n").unwrap();
        let err = load_project_config(&[], &dir.path().join("a.toml")).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }
}
