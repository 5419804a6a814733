//! Container runtime backed by the local Docker daemon

use anyhow::Context;
use bollard::{
    Docker,
    query_parameters::{StopContainerOptionsBuilder, UploadToContainerOptionsBuilder},
};
use dib_models::CommitSpec;

use crate::{
    archive::ArchiveStream,
    config::BuilderConfig,
    errors::RuntimeError,
    events::EventSink,
    runtime::{ContainerRuntime, ContainerSpec, ExecSpec},
};

mod cleanup;
mod commit;
mod create;
mod exec;
mod pull;

/// # Docker runtime
///
/// Drives build containers through the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
    pull_missing: bool,
    stop_timeout: u32,
    container_prefix: String,
}

impl DockerRuntime {
    pub fn new(client: Docker, config: &BuilderConfig) -> Self {
        Self {
            client,
            pull_missing: config.pull_missing,
            stop_timeout: config.stop_timeout,
            container_prefix: config.container_prefix.clone(),
        }
    }

    /// Connect to the local Docker daemon (honoring `DOCKER_HOST`) and make sure it is reachable.
    pub async fn connect(config: &BuilderConfig) -> anyhow::Result<Self> {
        let client = tokio::task::spawn_blocking(Docker::connect_with_local_defaults)
            .await?
            .context("could not connect to Docker")?;
        client.ping().await.context("Docker is not reachable")?;

        Ok(Self::new(client, config))
    }

    pub fn client(&self) -> &Docker {
        &self.client
    }

    /// Remove build containers left behind by builds that were killed. Returns the
    /// number of removed containers.
    pub async fn prune_build_containers(&self) -> Result<usize, RuntimeError> {
        cleanup::prune_build_containers(&self.client, &self.container_prefix).await
    }
}

/// The stop timeout as sent to the API, saturating instead of wrapping
fn stop_timeout_secs(timeout: u32) -> i32 {
    i32::try_from(timeout).unwrap_or(i32::MAX)
}

impl ContainerRuntime for DockerRuntime {
    async fn resolve_image(&self, image: &str, events: &EventSink) -> Result<(), RuntimeError> {
        pull::resolve_image(&self.client, image, self.pull_missing, events).await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let (body, options) = create::setup_container(spec);
        let response = self.client.create_container(Some(options), body).await?;
        for warning in response.warnings {
            tracing::warn!("Docker warning while creating '{}': {warning}", spec.name);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.client.start_container(id, None::<bollard::query_parameters::StartContainerOptions>).await?;
        Ok(())
    }

    async fn exec(&self, id: &str, spec: &ExecSpec, events: &EventSink) -> Result<i64, RuntimeError> {
        exec::exec(&self.client, id, spec, events).await
    }

    async fn upload(&self, id: &str, dst: &str, archive: ArchiveStream) -> Result<(), RuntimeError> {
        // The API only extracts into existing directories
        let mkdir = ExecSpec {
            command: vec!["mkdir".into(), "-p".into(), dst.to_owned()],
            user: Some("0".into()),
            workdir: None,
        };
        let exit_code = exec::exec(&self.client, id, &mkdir, &EventSink::default()).await?;
        if exit_code != 0 {
            return Err(RuntimeError::Rejected(format!(
                "could not create directory '{dst}' (exit code {exit_code})"
            )));
        }

        let options = UploadToContainerOptionsBuilder::new().path(dst).build();
        self.client
            .upload_to_container(id, Some(options), bollard::body_try_stream(archive))
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptionsBuilder::new()
            .t(stop_timeout_secs(self.stop_timeout))
            .build();
        match self.client.stop_container(id, Some(options)).await {
            Ok(_)
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn commit_container(&self, id: &str, spec: &CommitSpec) -> Result<String, RuntimeError> {
        commit::commit_container(&self.client, id, spec).await
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        cleanup::remove_container(&self.client, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::stop_timeout_secs;

    #[test]
    fn stop_timeout_saturates() {
        assert_eq!(stop_timeout_secs(10), 10);
        assert_eq!(stop_timeout_secs(u32::MAX), i32::MAX);
    }
}
