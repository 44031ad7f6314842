//! Build settings info, a JSON record of how artifacts were built, consumed by
//! compliance tooling. Entries written by other build steps are preserved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

use super::PythonBuildOptions;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildSettings {
    /// Earlier entries are carried as written, whatever fields they hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    python_build: Vec<Value>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildOptions {
    #[serde(rename = "createBOM")]
    create_bom: bool,
    publish: bool,
}

/// Append this build's settings to `options.build_settings_info`, or start a
/// new record when it is empty.
pub fn create_build_settings_info(options: &PythonBuildOptions) -> Result<String, AppError> {
    let mut settings: BuildSettings = if options.build_settings_info.trim().is_empty() {
        BuildSettings::default()
    } else {
        serde_json::from_str(&options.build_settings_info)
            .map_err(|e| AppError::Config(format!("invalid buildSettingsInfo: {e}")))?
    };

    let entry = serde_json::to_value(BuildOptions {
        create_bom: options.create_bom,
        publish: options.publish,
    })
    .map_err(|e| AppError::Exec(format!("cannot encode build settings info: {e}")))?;
    settings.python_build.push(entry);

    serde_json::to_string(&settings)
        .map_err(|e| AppError::Exec(format!("cannot encode build settings info: {e}")))
}
