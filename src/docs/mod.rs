//! Step documentation generator. Renders step metadata into markdown pages.

mod parameters;

use std::fs;
use std::path::{Path, PathBuf};

pub use parameters::{
    JENKINS_PARAMS, alias_list, create_parameters_section, format_default,
    parameter_further_info, parameter_mandatory_information, possible_value_list,
    resource_reference_details, scope_details, sort_step_parameters,
};

use crate::error::AppError;
use crate::metadata::{ParamDefault, Scope, StepData, StepParameter};

const SCRIPT_DESCRIPTION: &str = "The common script environment of the Jenkinsfile running. Typically the reference to the script calling the pipeline step is provided with the `this` parameter, as in `script: this`. This allows the function to access the `commonPipelineEnvironment` for retrieving, e.g. configuration parameters.";

fn doc_parameter(name: &str, param_type: &str, scope: &[Scope], description: &str) -> StepParameter {
    StepParameter {
        name: name.to_string(),
        param_type: param_type.to_string(),
        scope: scope.to_vec(),
        description: description.to_string(),
        ..StepParameter::default()
    }
}

/// Parameters every step accepts, plus execution environment parameters for
/// steps that run in containers.
fn common_parameters(step: &StepData) -> Vec<StepParameter> {
    use Scope::{General, Parameters, Stages, Steps};

    let mut params = vec![
        StepParameter {
            mandatory: true,
            ..doc_parameter("script", "Jenkins Script", &[Parameters], SCRIPT_DESCRIPTION)
        },
        StepParameter {
            default: Some(ParamDefault::Bool(false)),
            ..doc_parameter("verbose", "bool", &[Parameters, General, Steps, Stages], "verbose output")
        },
    ];

    if let Some(container) = step.spec.containers.first() {
        params.extend([
            StepParameter {
                default: Some(ParamDefault::Str(container.name.clone())),
                ..doc_parameter("containerName", "string", &[Steps, Stages], "Name of the container in which the step runs.")
            },
            StepParameter {
                default: Some(ParamDefault::Str(container.image.clone())),
                ..doc_parameter("dockerImage", "string", &[General, Parameters, Stages, Steps], "Name of the docker image that should be used.")
            },
            doc_parameter("dockerOptions", "[]string", &[General, Parameters, Stages, Steps], "Docker options to be set when starting the container."),
            doc_parameter("dockerWorkspace", "string", &[General, Parameters, Stages, Steps], "Kubernetes only: Specifies a dedicated user home directory for the container."),
            doc_parameter("stashContent", "[]string", &[Steps, Stages], "Specific stashes that should be considered for the step execution."),
        ]);
    }

    params
}

/// Copy of `step` with general and execution environment parameters added,
/// together with the names of the step's own parameters.
pub fn with_common_parameters(step: &StepData) -> (StepData, Vec<String>) {
    let step_parameter_names: Vec<String> = step.parameters().iter().map(|p| p.name.clone()).collect();
    let mut full = step.clone();
    for param in common_parameters(step) {
        if full.parameter(&param.name).is_none() {
            full.spec.inputs.parameters.push(param);
        }
    }
    (full, step_parameter_names)
}

/// Complete markdown page for one step.
pub fn generate_step_doc(step: &StepData) -> String {
    let (full, step_parameter_names) = with_common_parameters(step);

    let description = if step.metadata.long_description.is_empty() {
        &step.metadata.description
    } else {
        &step.metadata.long_description
    };

    let mut doc = format!("# {}\n\n## Description\n\n{}\n\n", step.name(), description);
    doc += &create_parameters_section(&full, &step_parameter_names);
    doc
}

/// Write `<out_dir>/<step>.md` for every step; returns the written paths.
pub fn write_step_docs(steps: &[StepData], out_dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(out_dir)
        .map_err(|e| AppError::Docs(format!("cannot create {}: {e}", out_dir.display())))?;

    let mut written = Vec::with_capacity(steps.len());
    for step in steps {
        if step.name().is_empty() {
            return Err(AppError::Docs("step metadata without a name".into()));
        }
        let path = out_dir.join(format!("{}.md", step.name()));
        fs::write(&path, generate_step_doc(step))
            .map_err(|e| AppError::Docs(format!("cannot write {}: {e}", path.display())))?;
        tracing::info!(step = %step.name(), path = %path.display(), "step documentation written");
        written.push(path);
    }
    Ok(written)
}
