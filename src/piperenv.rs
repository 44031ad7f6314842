//! Common Pipeline Environment: an on-disk key-value store shared between steps.
//!
//! Layout under the env root:
//! ```text
//! .pipeline/
//! └── commonPipelineEnvironment/
//!     └── custom/
//!         ├── buildSettingsInfo        (string value, written verbatim)
//!         └── someList.json            (any other value, JSON-encoded)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::AppError;

fn resource_path(root: &Path, resource: &str, name: &str) -> PathBuf {
    root.join(resource).join(name)
}

fn json_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".json");
    PathBuf::from(os)
}

/// Write one resource parameter. `name` may contain a category prefix such as
/// `custom/buildSettingsInfo`.
pub fn set_resource_parameter(
    root: &Path,
    resource: &str,
    name: &str,
    value: &Value,
) -> Result<(), AppError> {
    let path = resource_path(root, resource, name);
    let (target, content) = match value {
        Value::String(s) => (path, s.clone()),
        other => {
            let encoded = serde_json::to_string(other).map_err(|e| {
                AppError::Environment(format!("cannot encode {resource}/{name}: {e}"))
            })?;
            (json_path(&path), encoded)
        }
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Environment(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    fs::write(&target, content)
        .map_err(|e| AppError::Environment(format!("cannot write {}: {e}", target.display())))?;
    tracing::debug!(path = %target.display(), "resource parameter written");
    Ok(())
}

/// Read one resource parameter. Plain files come back as strings, `.json`
/// files decoded. `None` when the parameter was never set.
pub fn get_resource_parameter(
    root: &Path,
    resource: &str,
    name: &str,
) -> Result<Option<Value>, AppError> {
    let path = resource_path(root, resource, name);
    if path.is_file() {
        let content = fs::read_to_string(&path)
            .map_err(|e| AppError::Environment(format!("cannot read {}: {e}", path.display())))?;
        return Ok(Some(Value::String(content)));
    }

    let path = json_path(&path);
    if path.is_file() {
        let content = fs::read_to_string(&path)
            .map_err(|e| AppError::Environment(format!("cannot read {}: {e}", path.display())))?;
        let value = serde_json::from_str(&content)
            .map_err(|e| AppError::Environment(format!("invalid json in {}: {e}", path.display())))?;
        return Ok(Some(value));
    }

    Ok(None)
}

/// Write each `(name, value)` pair, logging failures without aborting.
/// Returns the number of parameters that could not be written.
pub fn persist_all(root: &Path, resource: &str, content: &[(&str, Value)]) -> usize {
    let mut err_count = 0;
    for (name, value) in content {
        if let Err(e) = set_resource_parameter(root, resource, name, value) {
            tracing::error!(error = %e, parameter = %name, "error persisting piper environment");
            err_count += 1;
        }
    }
    if err_count > 0 {
        tracing::error!(failed = err_count, "failed to persist piper environment");
    }
    err_count
}
