use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{Command, VolumeBinding};

/// A build plan: base image, build-time volumes and the steps to apply before committing
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct BuildPlan {
    /// Base image the build container is created from
    #[validate(length(min = 1, message = "base image must not be empty"))]
    #[schemars(example = "ubuntu:20.04")]
    pub base: String,
    /// Repository and optional tag of the committed image
    #[schemars(example = "myapp:1.0")]
    pub tag: Option<String>,
    /// Author recorded in the committed image
    pub author: Option<String>,
    /// Commit message recorded in the committed image
    pub message: Option<String>,
    /// Host paths mounted into the build container while the steps run
    #[serde(default)]
    #[validate(nested)]
    pub volumes: Vec<VolumeBinding>,
    /// Build steps, applied in order
    #[serde(default)]
    pub steps: Vec<Operation>,
}

/// A single build step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Set the working directory for later steps and the image
    Workdir { path: String },
    /// Run a command in the build container
    Run { command: Command },
    /// Copy a host file or directory into the directory `dst` of the container
    Copy {
        src: PathBuf,
        dst: String,
        #[serde(default)]
        crlf_to_lf: bool,
        mode: Option<u32>,
    },
    /// Set the user for later steps and the image
    User { name: String, group: Option<String> },
    /// Expose ports in the image
    Expose { ports: Vec<u16> },
    /// Declare volume mount points in the image
    Volume { paths: Vec<String> },
    /// Set the default command of the image
    Cmd { command: Command },
    /// Set the entrypoint of the image
    Entrypoint { command: Command },
    AptUpdate,
    AptInstall { packages: Vec<String> },
    AptClean,
    ApkUpdate,
    ApkAdd { packages: Vec<String> },
    ApkClean,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
base = "ubuntu:20.04"
tag = "repo:tag"

[[volumes]]
host = "./cache"
container = "/cache"
read_only = true

[[steps]]
op = "workdir"
path = "/app"

[[steps]]
op = "apt_install"
packages = ["curl", "ca-certificates"]

[[steps]]
op = "copy"
src = "scripts/start.sh"
dst = "bin"
crlf_to_lf = true

[[steps]]
op = "run"
command = "echo hi"

[[steps]]
op = "cmd"
command = ["echo", "hi"]
"#;

    #[test]
    fn parses_toml_plan() {
        let plan: BuildPlan = toml::from_str(PLAN).unwrap();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.base, "ubuntu:20.04");
        assert_eq!(plan.volumes, [VolumeBinding::new("./cache", "/cache").read_only(true)]);
        assert_eq!(plan.steps.len(), 5);
        assert_eq!(
            plan.steps[2],
            Operation::Copy {
                src: "scripts/start.sh".into(),
                dst: "bin".into(),
                crlf_to_lf: true,
                mode: None,
            }
        );
        assert_eq!(plan.steps[4], Operation::Cmd { command: Command::from(["echo", "hi"]) });
    }

    #[test]
    fn rejects_relative_volume_mount_point() {
        let plan: BuildPlan = toml::from_str(
            r#"
base = "alpine"
volumes = [{ host = "/srv", container = "srv" }]
"#,
        )
        .unwrap();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn rejects_unknown_operation() {
        let result = toml::from_str::<BuildPlan>(
            r#"
base = "alpine"
steps = [{ op = "launch_rockets" }]
"#,
        );
        assert!(result.is_err());
    }
}
