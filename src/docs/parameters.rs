//! Markdown rendering of a step's `## Parameters` section.
//!
//! `step_parameter_names` lists the step's own parameters; everything else in
//! the metadata (general, Jenkins and execution-environment parameters) was
//! appended for documentation and is rendered accordingly.

use crate::metadata::{
    Alias, DefaultItem, ParamDefault, REF_TYPE_SECRET, REF_TYPE_SYSTEM_TRUST_SECRET,
    REF_TYPE_VAULT_SECRET, REF_TYPE_VAULT_SECRET_FILE, ResourceReference, Scope, StepData,
    StepParameter, VAULT_ROOT_PATHS, display_value,
};

const VAULT_BADGE: &str = "![Vault](https://img.shields.io/badge/-Vault-lightgrey)";
const JENKINS_ONLY_BADGE: &str = "![Jenkins only](https://img.shields.io/badge/-Jenkins%20only-yellowgreen)";
const SECRET_BADGE: &str = "![Secret](https://img.shields.io/badge/-Secret-yellowgreen)";
const SYSTEM_TRUST_BADGE: &str = "![System Trust](https://img.shields.io/badge/-System%20Trust-lightblue)";
const DEPRECATED_BADGE: &str = "![deprecated](https://img.shields.io/badge/-deprecated-red)";

const JENKINS_CREDENTIALS_URL: &str = "https://www.jenkins.io/doc/book/using/using-credentials/";

/// Parameters that only matter when running inside Jenkins.
pub const JENKINS_PARAMS: [&str; 8] = [
    "containerCommand",
    "containerName",
    "containerShell",
    "dockerVolumeBind",
    "dockerWorkspace",
    "sidecarReadyCommand",
    "sidecarWorkspace",
    "stashContent",
];

fn contains(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n == name)
}

fn is_jenkins_param(name: &str) -> bool {
    JENKINS_PARAMS.contains(&name)
}

/// Render the full parameters section: step overview, execution environment
/// overview, then per-parameter details.
pub fn create_parameters_section(step: &StepData, step_parameter_names: &[String]) -> String {
    let mut parameters = String::from("## Parameters\n\n");

    let by_mandatory = sort_step_parameters(step.parameters(), true);
    parameters += "### Overview - Step\n\n";
    parameters += &create_parameter_overview(step, &by_mandatory, step_parameter_names, false);

    parameters += "### Overview - Execution Environment\n\n";
    parameters += "!!! note \"Orchestrator-specific only\"\n\n    These parameters are relevant for orchestrator usage and not considered when using the command line option.\n\n";
    parameters += &create_parameter_overview(step, &by_mandatory, step_parameter_names, true);

    let by_name = sort_step_parameters(step.parameters(), false);
    parameters += "### Details\n\n";
    parameters += &create_parameter_details(step, &by_name, step_parameter_names);

    parameters
}

/// Stable sort by name; with `consider_mandatory`, mandatory parameters
/// (including conditionally mandatory ones) come first.
pub fn sort_step_parameters(params: &[StepParameter], consider_mandatory: bool) -> Vec<&StepParameter> {
    let mut sorted: Vec<&StepParameter> = params.iter().collect();
    if consider_mandatory {
        sorted.sort_by(|a, b| {
            b.is_mandatory()
                .cmp(&a.is_mandatory())
                .then_with(|| a.name.cmp(&b.name))
        });
    } else {
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
    }
    sorted
}

/// Returns `(mandatory, mandatory marker, further info)`; `mandatoryIf`
/// conditions are appended to `further_info`.
pub fn parameter_mandatory_information(param: &StepParameter, further_info: &str) -> (bool, String, String) {
    let mut mandatory = param.mandatory;
    let mut info = further_info.to_string();

    if !param.mandatory_if.is_empty() {
        mandatory = true;
        if !info.is_empty() {
            info += "<br />";
        }
        let mut conditions = vec!["mandatory in case of:".to_string()];
        for condition in &param.mandatory_if {
            conditions.push(format!(
                "- [`{}`](#{})=`{}`",
                condition.name,
                condition.name.to_lowercase(),
                condition.value
            ));
        }
        info += &conditions.join("<br />");
    }

    let marker = if info.is_empty() { "**yes**" } else { "**(yes)**" };
    (mandatory, marker.to_string(), info)
}

fn create_parameter_overview(
    step: &StepData,
    params: &[&StepParameter],
    step_parameter_names: &[String],
    execution_environment: bool,
) -> String {
    let mut table = String::from("| Name | Mandatory | Additional information |\n");
    table += "| ---- | --------- | ---------------------- |\n";

    for param in params {
        let Some(further_info) =
            parameter_further_info(param, step, step_parameter_names, execution_environment)
        else {
            continue;
        };
        let (mandatory, marker, further_info) = parameter_mandatory_information(param, &further_info);
        table += &format!(
            "| [{}](#{}) | {} | {} |\n",
            param.name,
            param.name.to_lowercase(),
            if mandatory { marker.as_str() } else { "no" },
            further_info
        );
    }

    table += "\n";
    table
}

/// Additional information column for one parameter, or `None` when the
/// parameter does not belong in the requested table.
pub fn parameter_further_info(
    param: &StepParameter,
    step: &StepData,
    step_parameter_names: &[String],
    execution_environment: bool,
) -> Option<String> {
    let name = param.name.as_str();

    // general parameters
    if name == "verbose" {
        return check_parameter_info("activates debug output".into(), true, execution_environment);
    }
    if name == "script" {
        return check_parameter_info(
            format!("{JENKINS_ONLY_BADGE} reference to Jenkins main pipeline script"),
            true,
            execution_environment,
        );
    }

    // Jenkins-specific and execution environment parameters
    if !contains(step_parameter_names, name) {
        let jenkins_credential = step
            .spec
            .inputs
            .secrets
            .iter()
            .any(|s| s.name == name && s.secret_type == "jenkins");
        if jenkins_credential {
            return check_parameter_info(
                format!("{JENKINS_ONLY_BADGE} id of credentials ([using credentials]({JENKINS_CREDENTIALS_URL}))"),
                true,
                execution_environment,
            );
        }
        if is_jenkins_param(name) {
            return check_parameter_info(JENKINS_ONLY_BADGE.into(), false, execution_environment);
        }
        return check_parameter_info(String::new(), false, execution_environment);
    }

    // step parameters, including secrets
    let mut further_info = String::new();
    if !param.deprecation_message.is_empty() {
        further_info += DEPRECATED_BADGE;
    }
    if param.secret {
        let is_vault_secret = param.get_reference(REF_TYPE_VAULT_SECRET).is_some()
            || param.get_reference(REF_TYPE_VAULT_SECRET_FILE).is_some();
        let is_system_trust_secret = param.get_reference(REF_TYPE_SYSTEM_TRUST_SECRET).is_some();

        let mut secret_info = if is_vault_secret && is_system_trust_secret {
            format!(" {VAULT_BADGE} {SYSTEM_TRUST_BADGE} {SECRET_BADGE} pass via ENV, Vault, System Trust or Jenkins credentials")
        } else if is_vault_secret {
            format!(" {VAULT_BADGE} {SECRET_BADGE} pass via ENV, Vault or Jenkins credentials")
        } else {
            format!("{SECRET_BADGE} pass via ENV or Jenkins credentials")
        };

        for reference in param.resource_ref.iter().filter(|r| r.ref_type == REF_TYPE_SECRET) {
            secret_info += &format!(" ([`{}`](#{}))", reference.name, reference.name.to_lowercase());
        }
        further_info += &secret_info;
    }
    check_parameter_info(further_info, true, execution_environment)
}

/// Step parameters belong to the step table, all others to the execution
/// environment table.
fn check_parameter_info(further_info: String, step_param: bool, execution_environment: bool) -> Option<String> {
    (step_param != execution_environment).then_some(further_info)
}

fn create_parameter_details(
    step: &StepData,
    params: &[&StepParameter],
    step_parameter_names: &[String],
) -> String {
    let mut details = String::new();

    for param in params {
        details += &format!("#### {}\n\n", param.name);

        if !contains(step_parameter_names, &param.name) && is_jenkins_param(&param.name) {
            details += "**Jenkins-specific:** Used for proper environment setup.\n\n";
        }

        if !param.long_description.is_empty() {
            details += &param.long_description;
        } else {
            details += &param.description;
        }
        details += "\n\n";

        details += "[back to overview](#parameters)\n\n";

        details += "| Scope | Details |\n";
        details += "| ---- | --------- |\n";

        if !param.deprecation_message.is_empty() {
            details += &format!("| Deprecated | {} |\n", param.deprecation_message);
        }
        details += &format!("| Aliases | {} |\n", alias_list(&param.aliases));
        details += &format!("| Type | `{}` |\n", param.param_type);
        let (mandatory, mut marker, further_info) = parameter_mandatory_information(param, "");
        if mandatory && !further_info.is_empty() {
            marker = further_info;
        }
        details += &format!("| Mandatory | {} |\n", if mandatory { marker.as_str() } else { "no" });
        details += &format!("| Default | {} |\n", format_default(param, step_parameter_names));
        if let Some(values) = &param.possible_values {
            details += &format!("| Possible values | {} |\n", possible_value_list(values));
        }
        details += &format!("| Secret | {} |\n", if param.secret { "**yes**" } else { "no" });
        details += &format!("| Configuration scope | {} |\n", scope_details(&param.scope));
        details += &format!("| Resource references | {} |\n", resource_reference_details(&param.resource_ref));

        details += "\n\n";
    }

    for secret in &step.spec.inputs.secrets {
        details += &format!("#### {}\n\n", secret.name);

        if !contains(step_parameter_names, &secret.name) && is_jenkins_param(&secret.name) {
            details += &format!(
                "**Jenkins-specific:** Used for proper environment setup. See *[using credentials]({JENKINS_CREDENTIALS_URL})* for details.\n\n"
            );
        }

        details += &secret.description;
        details += "\n\n";

        details += "[back to overview](#parameters)\n\n";

        details += "| Scope | Details |\n";
        details += "| ---- | --------- |\n";
        details += &format!("| Aliases | {} |\n", alias_list(&secret.aliases));
        details += "| Type | `string` |\n";
        details += &format!(
            "| Configuration scope | {} |\n",
            scope_details(&[Scope::Parameters, Scope::General, Scope::Steps, Scope::Stages])
        );

        details += "\n\n";
    }

    details
}

fn conditional_default(key: &str, value: &str, def: &serde_json::Value) -> String {
    format!("{key}=`{value}`: `{}`", display_value(def))
}

/// Default column of the details table.
pub fn format_default(param: &StepParameter, step_parameter_names: &[String]) -> String {
    let Some(default) = &param.default else {
        // step parameters can always be provided through the environment
        if contains(step_parameter_names, &param.name) {
            return format!("`$PIPER_{}` (if set)", param.name);
        }
        return String::new();
    };

    match default {
        ParamDefault::List(items) if default.is_conditional() => items
            .iter()
            .filter_map(|item| match item {
                DefaultItem::Conditional(cond) if cond.is_unconditional() => {
                    Some(format!("`{}`", display_value(&cond.def)))
                }
                DefaultItem::Conditional(cond) => Some(conditional_default(&cond.key, &cond.value, &cond.def)),
                DefaultItem::Plain(_) => None,
            })
            .collect::<Vec<_>>()
            .join("<br />"),
        ParamDefault::List(items) if items.is_empty() => "`[]`".to_string(),
        ParamDefault::List(items) => items
            .iter()
            .map(|item| match item {
                DefaultItem::Conditional(cond) => conditional_default(&cond.key, &cond.value, &cond.def),
                DefaultItem::Plain(v) => format!("- `{}`", display_value(v)),
            })
            .collect::<Vec<_>>()
            .join("<br />"),
        ParamDefault::Map(map) => map
            .iter()
            .map(|(k, v)| format!("`{k}`: `{v}`"))
            .collect::<Vec<_>>()
            .join("<br />"),
        ParamDefault::Str(s) if s.is_empty() => "`''`".to_string(),
        ParamDefault::Str(s) => format!("`{s}`"),
        ParamDefault::Bool(b) => format!("`{b}`"),
        ParamDefault::Int(i) => format!("`{i}`"),
        ParamDefault::Float(f) => format!("`{f}`"),
    }
}

pub fn alias_list(aliases: &[Alias]) -> String {
    let render = |alias: &Alias, prefix: &str| {
        let mut out = format!("{prefix}`{}`", alias.name);
        if alias.deprecated {
            out += " (**deprecated**)";
        }
        out
    };
    match aliases {
        [] => "-".to_string(),
        [single] => render(single, ""),
        many => many
            .iter()
            .map(|a| render(a, "- "))
            .collect::<Vec<_>>()
            .join("<br />"),
    }
}

pub fn possible_value_list(values: &[serde_json::Value]) -> String {
    values
        .iter()
        .map(|v| format!("- `{}`", display_value(v)))
        .collect::<Vec<_>>()
        .join("<br />")
}

pub fn scope_details(scope: &[Scope]) -> String {
    let check = |s: Scope| if scope.contains(&s) { "&#9746;" } else { "&#9744;" };
    format!(
        "<ul><li>{} parameter</li><li>{} general</li><li>{} steps</li><li>{} stages</li></ul>",
        check(Scope::Parameters),
        check(Scope::General),
        check(Scope::Steps),
        check(Scope::Stages)
    )
}

pub fn resource_reference_details(references: &[ResourceReference]) -> String {
    if references.is_empty() {
        return "none".to_string();
    }

    let mut details = String::new();
    for resource in references {
        if resource.name == crate::metadata::COMMON_PIPELINE_ENVIRONMENT {
            details += "_commonPipelineEnvironment_:<br />";
            details += &format!("&nbsp;&nbsp;reference to: `{}`<br />", resource.param);
            continue;
        }

        match resource.ref_type.as_str() {
            REF_TYPE_SECRET => {
                details += "Jenkins credential id:<br />";
                for (i, alias) in resource.aliases.iter().enumerate() {
                    if i == 0 {
                        details += "&nbsp;&nbsp;aliases:<br />";
                    }
                    details += &format!(
                        "&nbsp;&nbsp;- `{}`{}<br />",
                        alias.name,
                        if alias.deprecated { " (**Deprecated**)" } else { "" }
                    );
                }
                details += &format!(
                    "&nbsp;&nbsp;id: [`{}`](#{})<br />",
                    resource.name,
                    resource.name.to_lowercase()
                );
                if !resource.param.is_empty() {
                    details += &format!("&nbsp;&nbsp;reference to: `{}`<br />", resource.param);
                }
            }
            REF_TYPE_VAULT_SECRET | REF_TYPE_VAULT_SECRET_FILE => add_vault_resource_details(resource, &mut details),
            REF_TYPE_SYSTEM_TRUST_SECRET => add_system_trust_resource_details(resource, &mut details),
            _ => {}
        }
    }

    details
}

fn join_vault_path(root: &str, rel: &str) -> String {
    let rel = rel.trim_matches('/');
    if rel.is_empty() {
        root.to_string()
    } else {
        format!("{}/{rel}", root.trim_end_matches('/'))
    }
}

fn add_vault_resource_details(resource: &ResourceReference, details: &mut String) {
    *details += "<br/>Vault resource:<br />";
    *details += &format!("&nbsp;&nbsp;name: `{}`<br />", resource.name);
    *details += &format!("&nbsp;&nbsp;default value: `{}`<br />", resource.default);
    *details += "<br/>Vault paths: <br />";
    *details += "<ul>";
    for root in VAULT_ROOT_PATHS {
        *details += &format!("<li>`{}`</li>", join_vault_path(root, &resource.default));
    }
    *details += "</ul>";
}

fn add_system_trust_resource_details(resource: &ResourceReference, details: &mut String) {
    *details += "<br/>System Trust resource:<br />";
    *details += &format!("&nbsp;&nbsp;name: `{}`<br />", resource.name);
    *details += &format!("&nbsp;&nbsp;value: `{}`<br />", resource.default);
}
