//! `pythonBuild`: builds a python project from its `setup.py` manifest into
//! a wheel and a source tarball, optionally creating a CycloneDX BOM and
//! publishing the artifacts with twine.

mod execute;
mod settings;

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::exec::ProcessRunner;
use crate::metadata::{
    COMMON_PIPELINE_ENVIRONMENT, Container, ParamDefault, ParameterDependence, ResourceReference,
    Scope, StepData, StepInputs, StepMetadata, StepOutputs, StepParameter, StepResource, StepSpec,
};
use crate::piperenv;
use crate::telemetry::{StepTelemetryData, Telemetry};

use super::{StepContext, prepare_config};

pub use execute::{PythonBuildUtils, python_build};
pub use settings::create_build_settings_info;

pub const STEP_NAME: &str = "pythonBuild";

pub const LONG_DESCRIPTION: &str = "Step build python project using the setup.py manifest and builds a wheel and tarball artifact. Please note that currently python build only supports setup.py

### build with dependencies from a private repository
if your build has dependencies from a private repository you can include the standard requirements.txt into the source code with `--extra-index-url` as the first line

```
--extra-index-url https://${PIPER_VAULTCREDENTIAL_USERNAME}:${PIPER_VAULTCREDENTIAL_PASSWORD}@<privateRepoUrl>/simple
```
`PIPER_VAULTCREDENTIAL_USERNAME` and `PIPER_VAULTCREDENTIAL_PASSWORD` are the username and password for the private repository
and are exposed as environment variables that must be present in the environment where the step runs.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PythonBuildOptions {
    pub build_flags: Vec<String>,
    pub setup_flags: Vec<String>,
    #[serde(rename = "createBOM")]
    pub create_bom: bool,
    pub publish: bool,
    pub target_repository_password: String,
    pub target_repository_user: String,
    #[serde(rename = "targetRepositoryURL")]
    pub target_repository_url: String,
    pub build_settings_info: String,
    pub virutal_environment_name: String,
    pub requirements_file_path: String,
}

/// Values the step leaves behind for later steps.
#[derive(Debug, Clone, Default)]
pub struct PythonBuildCommonPipelineEnvironment {
    pub custom: PythonBuildCustom,
}

#[derive(Debug, Clone, Default)]
pub struct PythonBuildCustom {
    pub build_settings_info: String,
}

impl PythonBuildCommonPipelineEnvironment {
    pub fn persist(&self, root: &Path) {
        piperenv::persist_all(
            root,
            COMMON_PIPELINE_ENVIRONMENT,
            &[(
                "custom/buildSettingsInfo",
                json!(self.custom.build_settings_info),
            )],
        );
    }
}

/// Command-line flags of the step. Unset flags leave the configured value
/// untouched.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PythonBuildFlags {
    /// Defines list of build flags passed to python binary.
    #[arg(long = "buildFlags", value_delimiter = ',', allow_hyphen_values = true)]
    pub build_flags: Option<Vec<String>>,
    /// Defines list of flags passed to setup.py.
    #[arg(long = "setupFlags", value_delimiter = ',', allow_hyphen_values = true)]
    pub setup_flags: Option<Vec<String>>,
    /// Creates the bill of materials (BOM) using CycloneDX plugin.
    #[arg(long = "createBOM", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub create_bom: Option<bool>,
    /// Configures the build to publish artifacts to a repository.
    #[arg(long = "publish", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub publish: Option<bool>,
    /// Password for the target repository where the compiled binaries shall be uploaded.
    #[arg(long = "targetRepositoryPassword")]
    pub target_repository_password: Option<String>,
    /// Username for the target repository where the compiled binaries shall be uploaded.
    #[arg(long = "targetRepositoryUser")]
    pub target_repository_user: Option<String>,
    /// URL of the target repository where the compiled binaries shall be uploaded.
    #[arg(long = "targetRepositoryURL")]
    pub target_repository_url: Option<String>,
    /// Information about the build settings used, for compliance processes.
    #[arg(long = "buildSettingsInfo")]
    pub build_settings_info: Option<String>,
    /// Name of the virtual environment that will be used for the build.
    #[arg(long = "virutalEnvironmentName")]
    pub virutal_environment_name: Option<String>,
    /// File path to the requirements.txt file needed for the sbom cycloneDx file creation.
    #[arg(long = "requirementsFilePath")]
    pub requirements_file_path: Option<String>,
}

impl PythonBuildFlags {
    /// Only the flags that were given, keyed by parameter name.
    pub fn flag_values(&self) -> Map<String, Value> {
        let mut values = Map::new();
        let mut put = |name: &str, value: Option<Value>| {
            if let Some(v) = value {
                values.insert(name.to_string(), v);
            }
        };
        put("buildFlags", self.build_flags.as_ref().map(|v| json!(v)));
        put("setupFlags", self.setup_flags.as_ref().map(|v| json!(v)));
        put("createBOM", self.create_bom.map(Value::Bool));
        put("publish", self.publish.map(Value::Bool));
        put("targetRepositoryPassword", self.target_repository_password.clone().map(Value::String));
        put("targetRepositoryUser", self.target_repository_user.clone().map(Value::String));
        put("targetRepositoryURL", self.target_repository_url.clone().map(Value::String));
        put("buildSettingsInfo", self.build_settings_info.clone().map(Value::String));
        put("virutalEnvironmentName", self.virutal_environment_name.clone().map(Value::String));
        put("requirementsFilePath", self.requirements_file_path.clone().map(Value::String));
        values
    }
}

pub fn run(ctx: &StepContext<'_>, flags: &PythonBuildFlags) -> Result<(), AppError> {
    run_with(ctx, flags, &mut ProcessRunner::new())
}

/// Full step run: config, build, then persist outputs and report telemetry
/// whether or not the build succeeded.
pub fn run_with<U: PythonBuildUtils>(
    ctx: &StepContext<'_>,
    flags: &PythonBuildFlags,
    utils: &mut U,
) -> Result<(), AppError> {
    let started = Instant::now();
    let span = tracing::info_span!("step", name = STEP_NAME);
    let _entered = span.enter();

    let metadata = metadata();
    let options: PythonBuildOptions = prepare_config(ctx, &metadata, flags.flag_values())?;

    let telemetry = Telemetry::new(ctx.general.no_telemetry);
    let mut data = StepTelemetryData::new(STEP_NAME, &ctx.general.correlation_id);
    let mut cpe = PythonBuildCommonPipelineEnvironment::default();

    let result = python_build(&options, utils, &mut cpe);

    cpe.persist(&ctx.general.env_root_path);
    if result.is_ok() {
        data.mark_success();
    }
    let category = result.as_ref().err().map(AppError::category).unwrap_or_default();
    data.finish(started, category);
    telemetry.log_step_telemetry_data(&data);

    result?;
    tracing::info!("SUCCESS");
    Ok(())
}

fn parameter(name: &str, param_type: &str, scope: &[Scope], default: ParamDefault) -> StepParameter {
    StepParameter {
        name: name.to_string(),
        param_type: param_type.to_string(),
        scope: scope.to_vec(),
        default: Some(default),
        ..StepParameter::default()
    }
}

fn env_parameter(name: &str, scope: &[Scope]) -> StepParameter {
    StepParameter {
        name: name.to_string(),
        param_type: "string".to_string(),
        scope: scope.to_vec(),
        ..StepParameter::default()
    }
}

/// Step metadata. Parameters without a default take `PIPER_<name>` from the
/// environment during config resolution.
pub fn metadata() -> StepData {
    use Scope::{General, Parameters, Stages, Steps};

    let with_ref = |p: StepParameter, param: &str, description: &str| StepParameter {
        resource_ref: vec![ResourceReference::common_pipeline_environment(param)],
        description: description.to_string(),
        ..p
    };
    let described = |p: StepParameter, description: &str| StepParameter {
        description: description.to_string(),
        ..p
    };

    let parameters = vec![
        described(
            parameter("buildFlags", "[]string", &[Parameters, Stages, Steps], ParamDefault::string_list(&[])),
            "Defines list of build flags passed to python binary.",
        ),
        described(
            parameter("setupFlags", "[]string", &[Parameters, Stages, Steps], ParamDefault::string_list(&[])),
            "Defines list of flags passed to setup.py.",
        ),
        described(
            parameter("createBOM", "bool", &[General, Steps, Stages, Parameters], ParamDefault::Bool(false)),
            "Creates the bill of materials (BOM) using CycloneDX plugin.",
        ),
        described(
            parameter("publish", "bool", &[Steps, Stages, Parameters], ParamDefault::Bool(false)),
            "Configures the build to publish artifacts to a repository.",
        ),
        StepParameter {
            secret: true,
            ..with_ref(
                env_parameter("targetRepositoryPassword", &[Parameters, Stages, Steps]),
                "custom/repositoryPassword",
                "Password for the target repository where the compiled binaries shall be uploaded - typically provided by the CI/CD environment.",
            )
        },
        StepParameter {
            secret: true,
            ..with_ref(
                env_parameter("targetRepositoryUser", &[Parameters, Stages, Steps]),
                "custom/repositoryUsername",
                "Username for the target repository where the compiled binaries shall be uploaded - typically provided by the CI/CD environment.",
            )
        },
        StepParameter {
            mandatory_if: vec![ParameterDependence { name: "publish".to_string(), value: "true".to_string() }],
            ..with_ref(
                env_parameter("targetRepositoryURL", &[Parameters, Stages, Steps]),
                "custom/repositoryUrl",
                "URL of the target repository where the compiled binaries shall be uploaded - typically provided by the CI/CD environment.",
            )
        },
        with_ref(
            env_parameter("buildSettingsInfo", &[Steps, Stages, Parameters]),
            "custom/buildSettingsInfo",
            "build settings info is typically filled by the step automatically to create information about the build settings that were used during the build. This information is typically used for compliance related processes.",
        ),
        described(
            parameter(
                "virutalEnvironmentName",
                "string",
                &[Steps, Stages, Parameters],
                ParamDefault::Str("piperBuild-env".to_string()),
            ),
            "name of the virtual environment that will be used for the build",
        ),
        described(
            parameter(
                "requirementsFilePath",
                "string",
                &[Steps, Stages, Parameters],
                ParamDefault::Str("requirements.txt".to_string()),
            ),
            "file path to the requirements.txt file needed for the sbom cycloneDx file creation.",
        ),
    ];

    StepData {
        metadata: StepMetadata {
            name: STEP_NAME.to_string(),
            aliases: Vec::new(),
            description: "Step builds a python project".to_string(),
            long_description: LONG_DESCRIPTION.to_string(),
        },
        spec: StepSpec {
            inputs: StepInputs { parameters, secrets: Vec::new() },
            containers: vec![Container { name: "python".to_string(), image: "python:3.9".to_string() }],
            outputs: StepOutputs {
                resources: vec![StepResource {
                    name: COMMON_PIPELINE_ENVIRONMENT.to_string(),
                    resource_type: "piperEnvironment".to_string(),
                    parameters: vec![[("name".to_string(), "custom/buildSettingsInfo".to_string())]
                        .into_iter()
                        .collect()],
                }],
            },
        },
    }
}
