use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::exec::{ExecRunner, FileUtils};

use super::settings::create_build_settings_info;
use super::{PythonBuildCommonPipelineEnvironment, PythonBuildOptions};

const BOM_FILE: &str = "bom-pip.xml";
const DIST_DIR: &str = "dist";

/// Everything the build needs from the outside world.
pub trait PythonBuildUtils: ExecRunner + FileUtils {}

impl<T: ExecRunner + FileUtils> PythonBuildUtils for T {}

fn venv_bin(venv: &Path, tool: &str) -> String {
    venv.join("bin").join(tool).to_string_lossy().into_owned()
}

fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Build inside a fresh virtual environment, which is removed afterwards even
/// when the build fails.
pub fn python_build<U: PythonBuildUtils>(
    options: &PythonBuildOptions,
    utils: &mut U,
    cpe: &mut PythonBuildCommonPipelineEnvironment,
) -> Result<(), AppError> {
    let venv = PathBuf::from(&options.virutal_environment_name);
    if venv.as_os_str().is_empty() {
        return Err(AppError::Config("virutalEnvironmentName must not be empty".into()));
    }
    if options.publish && options.target_repository_url.is_empty() {
        return Err(AppError::Config(
            "targetRepositoryURL must be set when publish is enabled".into(),
        ));
    }

    utils.run_executable(
        "python3",
        &args(["-m".to_string(), "venv".to_string(), venv.to_string_lossy().into_owned()]),
    )?;

    let result = build_in_venv(options, utils, &venv, cpe);

    if let Err(e) = utils.remove_all(&venv) {
        tracing::warn!(error = %e, venv = %venv.display(), "failed to remove virtual environment");
    }
    result
}

fn build_in_venv<U: PythonBuildUtils>(
    options: &PythonBuildOptions,
    utils: &mut U,
    venv: &Path,
    cpe: &mut PythonBuildCommonPipelineEnvironment,
) -> Result<(), AppError> {
    let mut build_args = options.build_flags.clone();
    build_args.push("setup.py".to_string());
    build_args.extend(options.setup_flags.iter().cloned());
    build_args.extend(args(["sdist", "bdist_wheel"]));
    utils.run_executable(&venv_bin(venv, "python"), &build_args)?;

    if options.create_bom {
        create_bom(options, utils, venv)?;
    }

    if options.publish {
        publish_with_twine(options, utils, venv)?;
    }

    cpe.custom.build_settings_info = create_build_settings_info(options)?;
    tracing::debug!(build_settings_info = %cpe.custom.build_settings_info, "build settings info created");
    Ok(())
}

fn create_bom<U: PythonBuildUtils>(
    options: &PythonBuildOptions,
    utils: &mut U,
    venv: &Path,
) -> Result<(), AppError> {
    utils.run_executable(&venv_bin(venv, "pip"), &args(["install", "cyclonedx-bom"]))?;
    utils.run_executable(
        &venv_bin(venv, "cyclonedx-py"),
        &args([
            "requirements",
            "--output-format",
            "XML",
            "--output-file",
            BOM_FILE,
            options.requirements_file_path.as_str(),
        ]),
    )
}

fn publish_with_twine<U: PythonBuildUtils>(
    options: &PythonBuildOptions,
    utils: &mut U,
    venv: &Path,
) -> Result<(), AppError> {
    let artifacts = utils.list_dir(Path::new(DIST_DIR))?;
    if artifacts.is_empty() {
        return Err(AppError::Exec(format!("no artifacts found in '{DIST_DIR}' to publish")));
    }

    utils.run_executable(&venv_bin(venv, "pip"), &args(["install", "twine"]))?;

    let mut upload = args([
        "upload",
        "--username",
        options.target_repository_user.as_str(),
        "--password",
        options.target_repository_password.as_str(),
        "--repository-url",
        options.target_repository_url.as_str(),
    ]);
    upload.extend(artifacts.iter().map(|p| p.to_string_lossy().into_owned()));
    utils.run_executable(&venv_bin(venv, "twine"), &upload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockUtils {
        calls: Vec<(String, Vec<String>)>,
        removed: Vec<PathBuf>,
        dist: Vec<PathBuf>,
        fail_on: Option<String>,
    }

    impl ExecRunner for MockUtils {
        fn run_executable(&mut self, program: &str, args: &[String]) -> Result<(), AppError> {
            self.calls.push((program.to_string(), args.to_vec()));
            if self.fail_on.as_deref() == Some(program) {
                return Err(AppError::Exec(format!("'{program}' exited with 1")));
            }
            Ok(())
        }
    }

    impl FileUtils for MockUtils {
        fn remove_all(&mut self, path: &Path) -> Result<(), AppError> {
            self.removed.push(path.to_path_buf());
            Ok(())
        }

        fn list_dir(&self, _dir: &Path) -> Result<Vec<PathBuf>, AppError> {
            Ok(self.dist.clone())
        }
    }

    fn options() -> PythonBuildOptions {
        PythonBuildOptions {
            virutal_environment_name: "venv".into(),
            requirements_file_path: "requirements.txt".into(),
            ..PythonBuildOptions::default()
        }
    }

    #[test]
    fn plain_build_runs_venv_and_setup() {
        let mut utils = MockUtils::default();
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        let opts = PythonBuildOptions {
            build_flags: vec!["-O".into()],
            setup_flags: vec!["--quiet".into()],
            ..options()
        };
        python_build(&opts, &mut utils, &mut cpe).unwrap();

        assert_eq!(utils.calls.len(), 2);
        assert_eq!(utils.calls[0].0, "python3");
        assert_eq!(utils.calls[0].1, vec!["-m", "venv", "venv"]);
        assert_eq!(utils.calls[1].0, "venv/bin/python");
        assert_eq!(utils.calls[1].1, vec!["-O", "setup.py", "--quiet", "sdist", "bdist_wheel"]);
        assert_eq!(utils.removed, vec![PathBuf::from("venv")]);
        assert!(cpe.custom.build_settings_info.contains("pythonBuild"));
    }

    #[test]
    fn bom_creation_uses_requirements_file() {
        let mut utils = MockUtils::default();
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        python_build(&PythonBuildOptions { create_bom: true, ..options() }, &mut utils, &mut cpe).unwrap();

        let programs: Vec<&str> = utils.calls.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(programs, vec!["python3", "venv/bin/python", "venv/bin/pip", "venv/bin/cyclonedx-py"]);
        let bom_args = &utils.calls[3].1;
        assert_eq!(bom_args.first().map(String::as_str), Some("requirements"));
        assert_eq!(bom_args.last().map(String::as_str), Some("requirements.txt"));
        assert!(bom_args.contains(&BOM_FILE.to_string()));
    }

    #[test]
    fn publish_uploads_dist_artifacts() {
        let mut utils = MockUtils {
            dist: vec![PathBuf::from("dist/pkg-1.0.tar.gz"), PathBuf::from("dist/pkg-1.0-py3-none-any.whl")],
            ..MockUtils::default()
        };
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        let opts = PythonBuildOptions {
            publish: true,
            target_repository_url: "https://pypi.example".into(),
            target_repository_user: "user".into(),
            target_repository_password: "secret".into(),
            ..options()
        };
        python_build(&opts, &mut utils, &mut cpe).unwrap();

        let (program, upload) = utils.calls.last().unwrap();
        assert_eq!(program, "venv/bin/twine");
        assert_eq!(
            upload,
            &vec![
                "upload",
                "--username",
                "user",
                "--password",
                "secret",
                "--repository-url",
                "https://pypi.example",
                "dist/pkg-1.0.tar.gz",
                "dist/pkg-1.0-py3-none-any.whl",
            ]
        );
    }

    #[test]
    fn publish_without_url_is_config_error() {
        let mut utils = MockUtils::default();
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        let err = python_build(&PythonBuildOptions { publish: true, ..options() }, &mut utils, &mut cpe).unwrap_err();
        assert!(err.to_string().contains("targetRepositoryURL"));
        assert!(utils.calls.is_empty(), "nothing may run before the check");
        assert!(utils.removed.is_empty());
    }

    #[test]
    fn publish_without_artifacts_fails() {
        let mut utils = MockUtils::default();
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        let opts = PythonBuildOptions { publish: true, target_repository_url: "https://x".into(), ..options() };
        let err = python_build(&opts, &mut utils, &mut cpe).unwrap_err();
        assert!(err.to_string().contains("no artifacts"));
    }

    #[test]
    fn failed_build_still_removes_venv() {
        let mut utils = MockUtils { fail_on: Some("venv/bin/python".into()), ..MockUtils::default() };
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        let err = python_build(&options(), &mut utils, &mut cpe).unwrap_err();
        assert!(matches!(err, AppError::Exec(_)));
        assert_eq!(utils.removed, vec![PathBuf::from("venv")]);
        assert!(cpe.custom.build_settings_info.is_empty());
    }

    #[test]
    fn empty_venv_name_rejected() {
        let mut utils = MockUtils::default();
        let mut cpe = PythonBuildCommonPipelineEnvironment::default();
        let opts = PythonBuildOptions { virutal_environment_name: String::new(), ..options() };
        assert!(python_build(&opts, &mut utils, &mut cpe).is_err());
        assert!(utils.calls.is_empty());
    }
}
