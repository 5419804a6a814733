//! Shared models for dib build plans, image configuration and build events

use std::{
    borrow::Cow,
    collections::BTreeSet,
    fmt::{self, Display},
    str::FromStr,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

mod plan;
mod reference;

pub use plan::{BuildPlan, Operation};
pub use reference::{ImageReference, ReferenceError};

/// A host path bind-mounted into the build container while the build runs.
/// Build-time volumes are never part of the committed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct VolumeBinding {
    /// Path on the host, or the name of a named volume
    #[serde(alias = "host")]
    #[validate(length(min = 1, message = "host path must not be empty"))]
    #[schemars(example = "./cache")]
    pub host_path: String,
    /// Absolute mount point inside the build container
    #[serde(alias = "container")]
    #[validate(custom(function = "validate_container_path"))]
    #[schemars(example = "/var/cache/build")]
    pub container_path: String,
    /// Mount the volume read-only
    #[serde(default)]
    pub read_only: bool,
}

impl VolumeBinding {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Bind string in the `HOST:CONTAINER[:ro]` form understood by the Docker API.
    pub fn bind_spec(&self) -> String {
        let mode = if self.read_only { ":ro" } else { "" };
        format!("{}:{}{mode}", self.host_path, self.container_path)
    }
}

fn validate_container_path(path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ValidationError::new("relative_path")
            .with_message("container path must be absolute".into()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid volume '{0}': expected HOST:CONTAINER[:ro|rw]")]
pub struct ParseBindingError(String);

impl FromStr for VolumeBinding {
    type Err = ParseBindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (host, container, read_only) = match parts.as_slice() {
            [host, container] => (*host, *container, false),
            [host, container, "ro"] => (*host, *container, true),
            [host, container, "rw"] => (*host, *container, false),
            _ => return Err(ParseBindingError(s.to_owned())),
        };
        if host.is_empty() || container.is_empty() {
            return Err(ParseBindingError(s.to_owned()));
        }

        Ok(VolumeBinding::new(host, container).read_only(read_only))
    }
}

/// A command for `run`, `cmd` or `entrypoint`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Command {
    /// # Shell form
    /// Passed to the configured shell, e.g. `/bin/sh -c "<command>"`
    Shell(String),
    /// # Exec form
    /// Executed as-is without a shell
    Exec(Vec<String>),
}

impl Command {
    /// The argument vector to execute, wrapping shell-form commands in `shell`.
    pub fn to_argv(&self, shell: &[String]) -> Vec<String> {
        match self {
            Command::Shell(command) => shell
                .iter()
                .cloned()
                .chain(std::iter::once(command.clone()))
                .collect(),
            Command::Exec(args) => args.clone(),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Shell(command) => f.write_str(command),
            Command::Exec(args) => {
                let quoted: Vec<_> = args.iter().map(|arg| quote(arg)).collect();
                f.write_str(&quoted.join(" "))
            }
        }
    }
}

impl From<&str> for Command {
    fn from(command: &str) -> Self {
        Command::Shell(command.to_owned())
    }
}

impl From<String> for Command {
    fn from(command: String) -> Self {
        Command::Shell(command)
    }
}

impl From<Vec<String>> for Command {
    fn from(args: Vec<String>) -> Self {
        Command::Exec(args)
    }
}

impl From<&[&str]> for Command {
    fn from(args: &[&str]) -> Self {
        Command::Exec(args.iter().map(|arg| (*arg).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Command {
    fn from(args: [&str; N]) -> Self {
        Command::Exec(args.into_iter().map(str::to_owned).collect())
    }
}

/// Quote an argument for display so it could be pasted into a POSIX shell
fn quote(arg: &str) -> Cow<'_, str> {
    let is_plain = !arg.is_empty() && arg.chars().all(is_plain_char);
    if is_plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

fn is_plain_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '-' | '_' | '.' | '/' | '=' | ':' | '@' | '%' | '+' | ','
        )
}

/// Image metadata accumulated during a build session and applied when the
/// container is committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageConfig {
    /// Working directory of the image
    pub workdir: Option<String>,
    /// User (and optional group) the image runs as
    pub user: Option<String>,
    /// Exposed ports
    #[serde(default)]
    pub exposed_ports: BTreeSet<u16>,
    /// Declared volume mount points of the image
    #[serde(default)]
    pub volumes: BTreeSet<String>,
    /// Default command
    pub cmd: Option<Vec<String>>,
    /// Entrypoint
    pub entrypoint: Option<Vec<String>>,
}

/// Everything needed to commit a build container as a new image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommitSpec {
    /// Repository and optional tag of the new image
    pub image: ImageReference,
    /// Snapshot of the pending image config at commit time
    pub config: ImageConfig,
    pub author: Option<String>,
    /// Commit message
    pub message: Option<String>,
}

/// Options for copying files from the host into the build container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CopyOptions {
    /// Rewrite CRLF line endings to LF while copying. Only valid for regular files.
    #[serde(default)]
    pub crlf_to_lf: bool,
    /// Permission bits for the copied file, instead of the host file's mode.
    /// Only valid for regular files.
    pub mode: Option<u32>,
}

/// Chunk of the build event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BuildEvent {
    /// # Info
    /// Build steps and progress
    Info(String),
    /// # Debug
    /// Verbose progress, e.g. image pull status
    Debug(String),
    /// # Stdout
    /// Line of stdout from a command run in the build container
    Stdout(String),
    /// # Stderr
    /// Line of stderr from a command run in the build container
    Stderr(String),
    /// # Error
    /// The build failed. This should be the final chunk of the stream.
    Error(String),
}
