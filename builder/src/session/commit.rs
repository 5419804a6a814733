//! Committing a build session as a new image

use dib_models::{CommitSpec, ImageReference};

use crate::{
    errors::BuildError,
    runtime::ContainerRuntime,
    session::{BuildSession, SessionState},
};

/// Optional metadata recorded with a commit
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub author: Option<String>,
    pub message: Option<String>,
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// ID of the new image
    pub image_id: String,
    /// What was committed
    pub spec: CommitSpec,
}

impl<R: ContainerRuntime> BuildSession<R> {
    /// Commit the container as a new image tagged `tag` (`REPOSITORY[:TAG]`).
    pub async fn commit(&mut self, tag: &str) -> Result<CommitOutcome, BuildError> {
        self.commit_with(tag, CommitOptions::default()).await
    }

    /// Commit the container with the pending image config applied. The container is stopped,
    /// committed, and then removed. An invalid tag leaves the session active; any runtime
    /// failure discards it.
    pub async fn commit_with(
        &mut self,
        tag: &str,
        options: CommitOptions,
    ) -> Result<CommitOutcome, BuildError> {
        self.ensure_active()?;
        let image = ImageReference::parse(tag).map_err(|source| BuildError::InvalidTag {
            tag: tag.to_owned(),
            source,
        })?;
        let spec = CommitSpec {
            image,
            config: self.pending.clone(),
            author: options.author,
            message: options.message,
        };

        self.events.info(format!("COMMIT {}", spec.image)).await;
        let stopped = self.runtime.stop_container(&self.container_id).await;
        if let Err(err) = stopped {
            let err = BuildError::Commit {
                tag: tag.to_owned(),
                source: err,
            };
            return Err(self.abort(err).await);
        }
        let committed = self
            .runtime
            .commit_container(&self.container_id, &spec)
            .await;
        let image_id = match committed {
            Ok(image_id) => image_id,
            Err(err) => {
                let err = BuildError::Commit {
                    tag: tag.to_owned(),
                    source: err,
                };
                return Err(self.abort(err).await);
            }
        };

        self.finish(SessionState::Committed);
        self.remove_container().await;
        self.events
            .info(format!("Committed image '{}' with ID {image_id}", spec.image))
            .await;

        Ok(CommitOutcome { image_id, spec })
    }
}
