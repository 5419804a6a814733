use std::path::PathBuf;

use dib_models::ReferenceError;

use crate::session::SessionState;

/// Error returned by a container runtime adapter.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Docker client error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Rejected by runtime: {0}")]
    Rejected(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RuntimeError::NotFound(_)
                | RuntimeError::Docker(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    ..
                })
        )
    }
}

/// Broad category of a [`BuildError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input, reported before any runtime call. No side effects.
    Configuration,
    /// Failure surfaced by the container runtime. The session has been discarded.
    Runtime,
    /// Operation issued in the wrong session state.
    Lifecycle,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid volume binding: {0}")]
    InvalidBinding(String),
    #[error("Build-time volumes can not be registered after a build session was opened")]
    RegistryClosed,
    #[error("Invalid image tag '{tag}': {source}")]
    InvalidTag {
        tag: String,
        #[source]
        source: ReferenceError,
    },
    #[error("Invalid package name '{name}': {reason}")]
    InvalidPackage { name: String, reason: String },
    #[error("Invalid copy: {0}")]
    InvalidCopy(String),
    #[error("Invalid image config: {0}")]
    InvalidImageConfig(String),
    #[error("Copy source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("Could not read copy source {}: {source}", path.display())]
    HostIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Failed to create container from '{image}': {source}")]
    ContainerCreate {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("Command '{command}' failed with exit code {exit_code}")]
    CommandExecution { command: String, exit_code: i64 },
    #[error("Failed to execute '{command}': {source}")]
    Exec {
        command: String,
        #[source]
        source: RuntimeError,
    },
    #[error("Failed to copy {} into the container: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },
    #[error("Failed to commit image '{tag}': {source}")]
    Commit {
        tag: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Build session is not active (state: {0})")]
    SessionNotActive(SessionState),
    #[error("A build session is already active in this context")]
    SessionAlreadyActive,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::InvalidBinding(_)
            | BuildError::RegistryClosed
            | BuildError::InvalidTag { .. }
            | BuildError::InvalidPackage { .. }
            | BuildError::InvalidCopy(_)
            | BuildError::InvalidImageConfig(_)
            | BuildError::SourceNotFound(_)
            | BuildError::HostIo { .. } => ErrorKind::Configuration,
            BuildError::ImageNotFound(_)
            | BuildError::ContainerCreate { .. }
            | BuildError::CommandExecution { .. }
            | BuildError::Exec { .. }
            | BuildError::Copy { .. }
            | BuildError::Commit { .. } => ErrorKind::Runtime,
            BuildError::SessionNotActive(_) | BuildError::SessionAlreadyActive => {
                ErrorKind::Lifecycle
            }
        }
    }
}
