//! Step metadata model.
//!
//! Describes a step's parameters, secrets, containers and outputs. The
//! built-in steps construct it in code; the doc generator can also read it
//! from TOML files with the same shape (camelCase keys).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

pub const REF_TYPE_SECRET: &str = "secret";
pub const REF_TYPE_VAULT_SECRET: &str = "vaultSecret";
pub const REF_TYPE_VAULT_SECRET_FILE: &str = "vaultSecretFile";
pub const REF_TYPE_SYSTEM_TRUST_SECRET: &str = "systemTrustSecret";

/// Name of the resource shared between steps on disk.
pub const COMMON_PIPELINE_ENVIRONMENT: &str = "commonPipelineEnvironment";

/// Vault lookup roots; a vault resource default is appended to each.
pub const VAULT_ROOT_PATHS: [&str; 3] = [
    "$(vaultPath)",
    "$(vaultBasePath)/$(vaultPipelineName)",
    "$(vaultBasePath)/GROUP-SECRETS",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    pub metadata: StepMetadata,
    #[serde(default)]
    pub spec: StepSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetadata {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    #[serde(default)]
    pub inputs: StepInputs,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub outputs: StepOutputs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInputs {
    #[serde(default)]
    pub parameters: Vec<StepParameter>,
    #[serde(default)]
    pub secrets: Vec<StepSecret>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default)]
    pub resource_ref: Vec<ResourceReference>,
    #[serde(default)]
    pub scope: Vec<Scope>,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub mandatory_if: Vec<ParameterDependence>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamDefault>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_values: Option<Vec<Value>>,
    #[serde(default)]
    pub secret: bool,
    #[serde(default)]
    pub deprecation_message: String,
}

impl StepParameter {
    /// First resource reference of the given type.
    pub fn get_reference(&self, ref_type: &str) -> Option<&ResourceReference> {
        self.resource_ref.iter().find(|r| r.ref_type == ref_type)
    }

    /// Unconditionally mandatory, or mandatory under some condition.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory || !self.mandatory_if.is_empty()
    }

    pub fn in_scope(&self, scope: Scope) -> bool {
        self.scope.contains(&scope)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ref_type: String,
    #[serde(default)]
    pub param: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

impl ResourceReference {
    pub fn common_pipeline_environment(param: &str) -> Self {
        Self {
            name: COMMON_PIPELINE_ENVIRONMENT.to_string(),
            param: param.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    #[serde(default)]
    pub deprecated: bool,
}

/// `name` must equal `value` for the owning parameter to become mandatory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDependence {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSecret {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub secret_type: String,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutputs {
    #[serde(default)]
    pub resources: Vec<StepResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResource {
    pub name: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub parameters: Vec<BTreeMap<String, String>>,
}

/// Where a parameter may be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Parameters,
    General,
    Steps,
    Stages,
}

/// Parameter default as written in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamDefault {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<DefaultItem>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultItem {
    Conditional(ConditionDefault),
    Plain(Value),
}

/// Default that applies when parameter `key` has value `value`.
/// Empty `key` and `value` mean the default applies unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDefault {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "default")]
    pub def: Value,
}

impl ConditionDefault {
    pub fn is_unconditional(&self) -> bool {
        self.key.is_empty() || self.value.is_empty()
    }
}

impl ParamDefault {
    pub fn string_list(items: &[&str]) -> Self {
        ParamDefault::List(
            items
                .iter()
                .map(|s| DefaultItem::Plain(Value::String((*s).to_string())))
                .collect(),
        )
    }

    /// Concrete value for config resolution. Conditional entries are matched
    /// against `resolved`; an unmatched conditional-only default yields `None`.
    pub fn resolve(&self, resolved: &serde_json::Map<String, Value>) -> Option<Value> {
        match self {
            ParamDefault::Bool(b) => Some(Value::Bool(*b)),
            ParamDefault::Int(i) => Some(Value::from(*i)),
            ParamDefault::Float(f) => Some(Value::from(*f)),
            ParamDefault::Str(s) => Some(Value::String(s.clone())),
            ParamDefault::Map(m) => Some(Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            ParamDefault::List(items) if self.is_conditional() => items.iter().find_map(|item| {
                let DefaultItem::Conditional(cond) = item else {
                    return None;
                };
                let matches = cond.is_unconditional()
                    || resolved
                        .get(&cond.key)
                        .is_some_and(|v| display_value(v) == cond.value);
                matches.then(|| cond.def.clone())
            }),
            ParamDefault::List(items) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| match item {
                        DefaultItem::Plain(v) => Some(v.clone()),
                        DefaultItem::Conditional(cond) => resolved
                            .get(&cond.key)
                            .filter(|v| display_value(v) == cond.value)
                            .map(|_| cond.def.clone()),
                    })
                    .collect(),
            )),
        }
    }

    /// Non-empty list consisting only of conditional defaults.
    pub fn is_conditional(&self) -> bool {
        match self {
            ParamDefault::List(items) => {
                !items.is_empty()
                    && items.iter().all(|i| matches!(i, DefaultItem::Conditional(_)))
            }
            _ => false,
        }
    }
}

/// Render a JSON value the way it reads in docs and comparisons: strings bare,
/// everything else in its JSON form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl StepData {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn parameters(&self) -> &[StepParameter] {
        &self.spec.inputs.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&StepParameter> {
        self.spec.inputs.parameters.iter().find(|p| p.name == name)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| AppError::Docs(format!("invalid step metadata: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Docs(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| {
            AppError::Docs(format!("invalid step metadata in {}: {e}", path.display()))
        })
    }
}
