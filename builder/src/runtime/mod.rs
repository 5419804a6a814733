//! Container runtime capabilities used by build sessions

use std::{future::Future, sync::Arc};

use dib_models::{CommitSpec, VolumeBinding};

use crate::{archive::ArchiveStream, errors::RuntimeError, events::EventSink};

mod constants;
pub mod docker;

pub use constants::SESSION_ID_LEN;
pub use docker::DockerRuntime;

/// Container to create for a build session
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Command keeping the container alive while the build runs
    pub command: Vec<String>,
    /// Build-time volume bindings
    pub bindings: Arc<[VolumeBinding]>,
}

/// Whether `name` was generated for a build session: `prefix` followed by a session ID.
/// Names listed by Docker start with `/`.
pub fn is_build_container_name(name: &str, prefix: &str) -> bool {
    let Some(session_id) = name.trim_start_matches('/').strip_prefix(prefix) else {
        return false;
    };
    session_id.len() == SESSION_ID_LEN
        && session_id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Command to execute in a running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub command: Vec<String>,
    pub user: Option<String>,
    pub workdir: Option<String>,
}

/// The container runtime operations a build session is driven by. All
/// operations are expected to fail without partial side effects.
pub trait ContainerRuntime: Clone + Send + Sync + 'static {
    /// Make sure `image` is available, pulling it if the runtime is configured to.
    /// Fails with [`RuntimeError::NotFound`] if the image can't be resolved.
    fn resolve_image(
        &self,
        image: &str,
        events: &EventSink,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Create a container and return its ID. Volume bindings can only be given here.
    fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<String, RuntimeError>> + Send;

    fn start_container(&self, id: &str)
    -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Execute a command in the running container, streaming its output, and
    /// return the exit code.
    fn exec(
        &self,
        id: &str,
        spec: &ExecSpec,
        events: &EventSink,
    ) -> impl Future<Output = Result<i64, RuntimeError>> + Send;

    /// Extract a tar archive into the directory `dst` of the container.
    fn upload(
        &self,
        id: &str,
        dst: &str,
        archive: ArchiveStream,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    fn stop_container(&self, id: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Commit the container's filesystem and the given config as a new image,
    /// returning the image ID.
    fn commit_container(
        &self,
        id: &str,
        spec: &CommitSpec,
    ) -> impl Future<Output = Result<String, RuntimeError>> + Send;

    /// Forcefully remove the container.
    fn remove_container(&self, id: &str)
    -> impl Future<Output = Result<(), RuntimeError>> + Send;
}
