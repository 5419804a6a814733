//! Build session: one live container and its pending image config

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dib_models::{ImageConfig, VolumeBinding};

use crate::{
    config::BuilderConfig,
    errors::BuildError,
    events::EventSink,
    runtime::{ContainerRuntime, ContainerSpec, SESSION_ID_LEN},
};

mod commit;
mod operations;
mod packages;

pub use commit::{CommitOptions, CommitOutcome};
pub use packages::{PackageManager, PackageOps};

/// Lifecycle state of a [`BuildSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    /// The container exists but has not been started
    Created,
    /// The container is running and accepts operations
    Active,
    /// The container was committed as an image and removed
    Committed,
    /// The container was removed without being committed
    Discarded,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Discarded)
    }
}

/// # Build session
///
/// Owns one build container from creation until it is committed or discarded. Every
/// operation is applied to this container, and image metadata is collected in the
/// pending config until [`commit`](Self::commit).
///
/// Any runtime failure discards the session: the container is removed and later
/// operations fail with [`BuildError::SessionNotActive`]. A session that is dropped while
/// still active removes its container in the background, but [`close`](Self::close)
/// should be preferred so the removal is awaited.
pub struct BuildSession<R: ContainerRuntime> {
    runtime: R,
    config: Arc<BuilderConfig>,
    events: EventSink,
    base_image: String,
    container_id: String,
    bindings: Arc<[VolumeBinding]>,
    pending: ImageConfig,
    state: SessionState,
    /// Shared with the owning context, set while this session is not terminal
    active: Arc<AtomicBool>,
}

impl<R: ContainerRuntime> BuildSession<R> {
    /// Create and start a build container from `base_image` with the given build-time
    /// volumes mounted. `active` is released when the session reaches a terminal state.
    pub(crate) async fn open(
        runtime: R,
        config: Arc<BuilderConfig>,
        events: EventSink,
        base_image: &str,
        bindings: Arc<[VolumeBinding]>,
        active: Arc<AtomicBool>,
    ) -> Result<Self, BuildError> {
        events.info(format!("FROM {base_image}")).await;
        if let Err(err) = runtime.resolve_image(base_image, &events).await {
            active.store(false, Ordering::Release);
            return Err(if err.is_not_found() {
                BuildError::ImageNotFound(base_image.to_owned())
            } else {
                BuildError::ContainerCreate {
                    image: base_image.to_owned(),
                    source: err,
                }
            });
        }

        let name = format!("{}{}", config.container_prefix, Self::gen_session_id());
        let spec = ContainerSpec {
            name: name.clone(),
            image: base_image.to_owned(),
            command: config.idle_command.clone(),
            bindings: bindings.clone(),
        };
        for binding in bindings.iter() {
            events.debug(format!("Mounting build-time volume {}", binding.bind_spec())).await;
        }
        let container_id = match runtime.create_container(&spec).await {
            Ok(id) => id,
            Err(err) => {
                active.store(false, Ordering::Release);
                return Err(if err.is_not_found() {
                    BuildError::ImageNotFound(base_image.to_owned())
                } else {
                    BuildError::ContainerCreate {
                        image: base_image.to_owned(),
                        source: err,
                    }
                });
            }
        };
        tracing::debug!("Created build container '{name}' ({container_id})");

        let mut session = Self {
            runtime,
            config,
            events,
            base_image: base_image.to_owned(),
            container_id,
            bindings,
            pending: ImageConfig::default(),
            state: SessionState::Created,
            active,
        };
        if let Err(err) = session.runtime.start_container(&session.container_id).await {
            let err = BuildError::ContainerCreate {
                image: session.base_image.clone(),
                source: err,
            };
            return Err(session.abort(err).await);
        }
        session.state = SessionState::Active;

        Ok(session)
    }

    fn gen_session_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..SESSION_ID_LEN].to_owned()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    /// Build-time volumes mounted in the container. Fixed for the session's lifetime.
    pub fn volume_bindings(&self) -> &[VolumeBinding] {
        &self.bindings
    }

    /// Image config that will be applied on commit
    pub fn pending_config(&self) -> &ImageConfig {
        &self.pending
    }

    /// Discard the session (unless it was already committed or discarded) and return
    /// the final state.
    pub async fn close(mut self) -> SessionState {
        self.discard().await;
        self.state
    }

    /// Remove the container without committing it. Does nothing if the session has
    /// already reached a terminal state. Removal failures are logged, not returned.
    pub async fn discard(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.finish(SessionState::Discarded);
        self.events
            .info(format!("Discarding build container {}", self.short_id()))
            .await;
        self.remove_container().await;
    }

    pub(crate) fn ensure_active(&self) -> Result<(), BuildError> {
        match self.state {
            SessionState::Active => Ok(()),
            state => Err(BuildError::SessionNotActive(state)),
        }
    }

    /// Discard the session after a failed operation and hand back the original error.
    pub(crate) async fn abort(&mut self, err: BuildError) -> BuildError {
        self.events.error(err.to_string()).await;
        self.discard().await;
        err
    }

    /// Move to a terminal state and release the context's active-session slot
    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.active.store(false, Ordering::Release);
    }

    async fn remove_container(&self) {
        if let Err(err) = self.runtime.remove_container(&self.container_id).await {
            tracing::warn!(
                "Could not remove build container '{}': {err}",
                self.container_id
            );
        }
    }

    fn short_id(&self) -> &str {
        &self.container_id[..self.container_id.len().min(12)]
    }
}

impl<R: ContainerRuntime> Drop for BuildSession<R> {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.finish(SessionState::Discarded);
        tracing::warn!(
            "Build session dropped while active, removing container '{}'",
            self.container_id
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = self.runtime.clone();
                let id = std::mem::take(&mut self.container_id);
                handle.spawn(async move {
                    if let Err(err) = runtime.remove_container(&id).await {
                        tracing::warn!("Could not remove build container '{id}': {err}");
                    }
                });
            }
            Err(_) => tracing::error!(
                "No async runtime to remove build container '{}', it must be removed manually",
                self.container_id
            ),
        }
    }
}
