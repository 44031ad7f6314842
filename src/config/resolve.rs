//! Step configuration resolution and validation.
//!
//! Layers, later wins: metadata defaults (or `PIPER_<name>` from the
//! environment for parameters without one), `[general]`, `[steps.<step>]`,
//! `[stages.<stage>]`, Common Pipeline Environment references, command-line
//! flags. Config keys only apply to parameters whose scope allows them.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::metadata::{COMMON_PIPELINE_ENVIRONMENT, Scope, StepData, StepParameter, display_value};
use crate::piperenv;

use super::load::ProjectConfig;

/// Everything resolution needs for one step run.
pub struct ResolveInput<'a> {
    pub metadata: &'a StepData,
    pub project: &'a ProjectConfig,
    pub stage_name: Option<&'a str>,
    pub env_root: &'a Path,
    /// Environment-provided values for parameters that have no metadata default.
    pub env_defaults: Map<String, Value>,
    /// Only the flags passed on the command line.
    pub flags: Map<String, Value>,
}

/// Resolved parameter values keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepConfig {
    values: Map<String, Value>,
}

impl StepConfig {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Deserialize into a typed options struct (camelCase field names).
    pub fn into_options<T: DeserializeOwned>(self) -> Result<T, AppError> {
        serde_json::from_value(Value::Object(self.values))
            .map_err(|e| AppError::Config(format!("invalid step configuration: {e}")))
    }
}

pub fn resolve(input: ResolveInput<'_>) -> Result<StepConfig, AppError> {
    let metadata = input.metadata;
    let step_name = metadata.name();
    let mut values = Map::new();

    for param in metadata.parameters() {
        match &param.default {
            Some(default) if !default.is_conditional() => {
                if let Some(v) = default.resolve(&values) {
                    values.insert(param.name.clone(), v);
                }
            }
            Some(_) => {}
            None => {
                if let Some(v) = input.env_defaults.get(&param.name).filter(|v| !is_empty(v)) {
                    values.insert(param.name.clone(), coerce(param, v.clone()));
                }
            }
        }
    }

    if let Some(general) = input.project.general() {
        apply_section(&mut values, general, Scope::General, metadata, "general")?;
    }

    let step_section = input.project.step(step_name).or_else(|| {
        metadata
            .metadata
            .aliases
            .iter()
            .find_map(|alias| input.project.step(&alias.name))
    });
    if let Some(step) = step_section {
        apply_section(&mut values, step, Scope::Steps, metadata, "steps")?;
    }

    if let Some(stage_name) = input.stage_name {
        if let Some(stage) = input.project.stage(stage_name) {
            apply_section(&mut values, stage, Scope::Stages, metadata, "stages")?;
        }
    }

    apply_resource_references(&mut values, metadata, input.env_root);

    for (key, value) in input.flags {
        values.insert(key, value);
    }

    for param in metadata.parameters() {
        if values.contains_key(&param.name) {
            continue;
        }
        if let Some(default) = param.default.as_ref().filter(|d| d.is_conditional()) {
            if let Some(v) = default.resolve(&values) {
                values.insert(param.name.clone(), v);
            }
        }
    }

    Ok(StepConfig { values })
}

fn find_parameter<'a>(metadata: &'a StepData, key: &str) -> Option<&'a StepParameter> {
    metadata.parameter(key).or_else(|| {
        metadata
            .parameters()
            .iter()
            .find(|p| p.aliases.iter().any(|a| a.name == key))
    })
}

fn apply_section(
    values: &mut Map<String, Value>,
    section: &toml::Table,
    scope: Scope,
    metadata: &StepData,
    label: &str,
) -> Result<(), AppError> {
    for (key, raw) in section {
        let Some(param) = find_parameter(metadata, key) else {
            tracing::debug!(key = %key, section = label, "ignoring unknown config key");
            continue;
        };
        if !param.in_scope(scope) {
            tracing::debug!(parameter = %param.name, section = label, "parameter not configurable in this section");
            continue;
        }
        if let Some(alias) = param.aliases.iter().find(|a| a.name == *key) {
            if alias.deprecated {
                tracing::warn!(
                    alias = %alias.name,
                    parameter = %param.name,
                    "deprecated parameter alias used, please switch to the parameter name"
                );
            }
        }
        let value = serde_json::to_value(raw)
            .map_err(|e| AppError::Config(format!("cannot convert {label}.{key}: {e}")))?;
        values.insert(param.name.clone(), coerce(param, value));
    }
    Ok(())
}

fn apply_resource_references(values: &mut Map<String, Value>, metadata: &StepData, env_root: &Path) {
    for param in metadata.parameters() {
        for reference in &param.resource_ref {
            if reference.name != COMMON_PIPELINE_ENVIRONMENT || !reference.ref_type.is_empty() {
                continue;
            }
            match piperenv::get_resource_parameter(env_root, COMMON_PIPELINE_ENVIRONMENT, &reference.param) {
                Ok(Some(value)) if !is_empty(&value) => {
                    tracing::debug!(parameter = %param.name, reference = %reference.param, "value taken from pipeline environment");
                    values.insert(param.name.clone(), coerce(param, value));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, parameter = %param.name, "cannot read pipeline environment reference");
                }
            }
        }
    }
}

/// Accept the obvious string spellings for list and bool parameters.
fn coerce(param: &StepParameter, value: Value) -> Value {
    match (param.param_type.as_str(), value) {
        ("[]string", Value::String(s)) => Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| Value::String(p.to_string()))
                .collect(),
        ),
        ("bool", Value::String(s)) if s == "true" || s == "false" => Value::Bool(s == "true"),
        (_, v) => v,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Check mandatory, conditionally mandatory and possible-value constraints.
pub fn validate(metadata: &StepData, config: &StepConfig) -> Result<(), AppError> {
    let mut failures = Vec::new();

    for param in metadata.parameters() {
        let value = config.get(&param.name).filter(|v| !is_empty(v));

        if value.is_none() {
            if param.mandatory {
                failures.push(format!("the parameter '{}' is mandatory", param.name));
            }
            for cond in &param.mandatory_if {
                let triggered = config
                    .get(&cond.name)
                    .is_some_and(|v| display_value(v) == cond.value);
                if triggered {
                    failures.push(format!(
                        "the parameter '{}' is mandatory when '{}' is '{}'",
                        param.name, cond.name, cond.value
                    ));
                }
            }
        }

        if let (Some(value), Some(possible)) = (value, &param.possible_values) {
            if possible.is_empty() {
                continue;
            }
            let allowed: Vec<String> = possible.iter().map(display_value).collect();
            let given: Vec<String> = match value {
                Value::Array(items) => items.iter().map(display_value).collect(),
                other => vec![display_value(other)],
            };
            for g in given {
                if !allowed.contains(&g) {
                    failures.push(format!(
                        "the value '{g}' of parameter '{}' is not one of [{}]",
                        param.name,
                        allowed.join(", ")
                    ));
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Alias, ParamDefault, ParameterDependence, ResourceReference};
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn param(name: &str, ty: &str, scope: &[Scope], default: Option<ParamDefault>) -> StepParameter {
        StepParameter {
            name: name.into(),
            param_type: ty.into(),
            scope: scope.to_vec(),
            default,
            ..StepParameter::default()
        }
    }

    fn step() -> StepData {
        let mut data = StepData::default();
        data.metadata.name = "demo".into();
        data.spec.inputs.parameters = vec![
            param("flags", "[]string", &[Scope::Parameters, Scope::Steps], Some(ParamDefault::string_list(&[]))),
            param("publish", "bool", &[Scope::Steps, Scope::Stages], Some(ParamDefault::Bool(false))),
            param("createBOM", "bool", &[Scope::General, Scope::Steps], Some(ParamDefault::Bool(false))),
            StepParameter {
                aliases: vec![Alias { name: "repoUrl".into(), deprecated: true }],
                resource_ref: vec![ResourceReference::common_pipeline_environment("custom/repositoryUrl")],
                ..param("url", "string", &[Scope::Steps], Some(ParamDefault::Str(String::new())))
            },
        ];
        data
    }

    fn resolve_with(project: &str, stage: Option<&str>, root: &Path, flags: Map<String, Value>) -> StepConfig {
        let metadata = step();
        let project = ProjectConfig::from_toml_str(project).unwrap();
        resolve(ResolveInput {
            metadata: &metadata,
            project: &project,
            stage_name: stage,
            env_root: root,
            env_defaults: Map::new(),
            flags,
        })
        .unwrap()
    }

    /// Log writer that keeps everything written in memory.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn defaults_apply_without_config() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve_with("", None, dir.path(), Map::new());
        assert_eq!(cfg.get("flags"), Some(&json!([])));
        assert_eq!(cfg.get("publish"), Some(&json!(false)));
        assert_eq!(cfg.get("url"), Some(&json!("")));
    }

    #[test]
    fn general_section_respects_scope() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve_with("[general]\npublish = true\ncreateBOM = true\n", None, dir.path(), Map::new());
        assert_eq!(cfg.get("publish"), Some(&json!(false)), "publish is not GENERAL-scoped");
        assert_eq!(cfg.get("createBOM"), Some(&json!(true)));
    }

    #[test]
    fn stage_overrides_step() {
        let dir = TempDir::new().unwrap();
        let project = "[steps.demo]\npublish = false\n[stages.Release]\npublish = true\n";
        assert_eq!(resolve_with(project, Some("Release"), dir.path(), Map::new()).get("publish"), Some(&json!(true)));
        assert_eq!(resolve_with(project, Some("Build"), dir.path(), Map::new()).get("publish"), Some(&json!(false)));
    }

    #[test]
    fn flags_override_everything() {
        let dir = TempDir::new().unwrap();
        let mut flags = Map::new();
        flags.insert("publish".into(), json!(false));
        let cfg = resolve_with("[stages.Release]\npublish = true\n", Some("Release"), dir.path(), flags);
        assert_eq!(cfg.get("publish"), Some(&json!(false)));
    }

    #[test]
    fn alias_maps_to_parameter() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve_with("[steps.demo]\nrepoUrl = \"https://a\"\n", None, dir.path(), Map::new());
        assert_eq!(cfg.get("url"), Some(&json!("https://a")));
    }

    #[test]
    fn deprecated_alias_logs_warning() {
        let dir = TempDir::new().unwrap();
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            resolve_with("[steps.demo]\nrepoUrl = \"https://a\"\n", None, dir.path(), Map::new());
        });
        let text = logs.text();
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("deprecated parameter alias used"), "{text}");
        assert!(text.contains("alias=repoUrl"), "{text}");

        let quiet = Captured::default();
        let writer = quiet.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            resolve_with("[steps.demo]\nurl = \"https://a\"\n", None, dir.path(), Map::new());
        });
        assert!(!quiet.text().contains("deprecated parameter alias"));
    }

    #[test]
    fn environment_fills_parameters_without_default() {
        let dir = TempDir::new().unwrap();
        let mut metadata = step();
        metadata.spec.inputs.parameters.push(param("user", "string", &[Scope::Steps], None));
        let mut env_defaults = Map::new();
        env_defaults.insert("user".into(), json!("ci-user"));
        env_defaults.insert("publish".into(), json!("true"));

        let run = |project: &str| {
            let project = ProjectConfig::from_toml_str(project).unwrap();
            resolve(ResolveInput {
                metadata: &metadata,
                project: &project,
                stage_name: None,
                env_root: dir.path(),
                env_defaults: env_defaults.clone(),
                flags: Map::new(),
            })
            .unwrap()
        };

        let cfg = run("");
        assert_eq!(cfg.get("user"), Some(&json!("ci-user")));
        assert_eq!(cfg.get("publish"), Some(&json!(false)), "metadata default wins over environment");

        let cfg = run("[steps.demo]\nuser = \"from-config\"\n");
        assert_eq!(cfg.get("user"), Some(&json!("from-config")));
    }

    #[test]
    fn pipeline_environment_reference_beats_config() {
        let dir = TempDir::new().unwrap();
        piperenv::set_resource_parameter(dir.path(), COMMON_PIPELINE_ENVIRONMENT, "custom/repositoryUrl", &json!("https://cpe"))
            .unwrap();
        let cfg = resolve_with("[steps.demo]\nurl = \"https://cfg\"\n", None, dir.path(), Map::new());
        assert_eq!(cfg.get("url"), Some(&json!("https://cpe")));
    }

    #[test]
    fn comma_string_coerced_to_list() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve_with("[steps.demo]\nflags = \"-v, -q\"\n", None, dir.path(), Map::new());
        assert_eq!(cfg.get("flags"), Some(&json!(["-v", "-q"])));
    }

    #[test]
    fn unknown_keys_ignored() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve_with("[steps.demo]\nbogus = 1\n", None, dir.path(), Map::new());
        assert!(cfg.get("bogus").is_none());
    }

    #[test]
    fn validate_reports_missing_mandatory() {
        let mut metadata = step();
        metadata.spec.inputs.parameters.push(StepParameter { mandatory: true, ..param("token", "string", &[], None) });
        let err = validate(&metadata, &StepConfig::default()).unwrap_err();
        assert!(err.to_string().contains("'token' is mandatory"));
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }

    #[test]
    fn validate_mandatory_if_triggers_on_value() {
        let mut metadata = step();
        metadata.spec.inputs.parameters.push(StepParameter {
            mandatory_if: vec![ParameterDependence { name: "publish".into(), value: "true".into() }],
            ..param("password", "string", &[], None)
        });
        let mut values = Map::new();
        values.insert("publish".into(), json!(false));
        assert!(validate(&metadata, &StepConfig { values: values.clone() }).is_ok());
        values.insert("publish".into(), json!(true));
        let err = validate(&metadata, &StepConfig { values }).unwrap_err();
        assert!(err.to_string().contains("'password' is mandatory when 'publish' is 'true'"));
    }

    #[test]
    fn validate_possible_values() {
        let mut metadata = step();
        metadata.spec.inputs.parameters.push(StepParameter {
            possible_values: Some(vec![json!("maven"), json!("npm")]),
            ..param("buildTool", "string", &[], None)
        });
        let mut values = Map::new();
        values.insert("buildTool".into(), json!("npm"));
        assert!(validate(&metadata, &StepConfig { values: values.clone() }).is_ok());
        values.insert("buildTool".into(), json!("gradle"));
        let err = validate(&metadata, &StepConfig { values }).unwrap_err();
        assert!(err.to_string().contains("'gradle'"));
    }

    #[test]
    fn into_options_reports_type_mismatch() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Opts {
            publish: bool,
        }
        let mut values = Map::new();
        values.insert("publish".into(), json!("maybe"));
        let err = StepConfig { values }.into_options::<Opts>().err().unwrap();
        assert!(err.to_string().contains("invalid step configuration"));
    }
}
