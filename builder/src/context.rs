//! Build context: runtime, configuration and build-time volumes for one caller

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dib_models::{BuildEvent, VolumeBinding};
use tokio::sync::mpsc;

use crate::{
    config::BuilderConfig, errors::BuildError, events::EventSink, registry::VolumeBindingRegistry,
    runtime::ContainerRuntime, session::BuildSession,
};

/// # Build context
///
/// Entry point for building images. Register build-time volumes first, then open a
/// session from a base image. Only one session can be active per context at a time.
pub struct BuildContext<R: ContainerRuntime> {
    runtime: R,
    config: Arc<BuilderConfig>,
    registry: VolumeBindingRegistry,
    events: EventSink,
    active: Arc<AtomicBool>,
}

impl<R: ContainerRuntime> BuildContext<R> {
    pub fn new(runtime: R, config: BuilderConfig) -> Self {
        Self {
            runtime,
            config: Arc::new(config),
            registry: VolumeBindingRegistry::new(),
            events: EventSink::default(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send build events (steps, command output, errors) to `tx`
    pub fn with_events(mut self, tx: mpsc::Sender<BuildEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Mount `host_path` at `container_path` in build containers. Must be called
    /// before a session is opened.
    pub fn buildtime_volume(
        &mut self,
        host_path: impl Into<String>,
        container_path: impl Into<String>,
    ) -> Result<(), BuildError> {
        self.registry.register(host_path, container_path)
    }

    /// Register a build-time volume binding, see [`buildtime_volume`](Self::buildtime_volume)
    pub fn buildtime_binding(&mut self, binding: VolumeBinding) -> Result<(), BuildError> {
        self.registry.register_binding(binding)
    }

    pub fn volumes(&self) -> &VolumeBindingRegistry {
        &self.registry
    }

    /// Open a build session from `base_image`. This freezes the build-time volumes.
    pub async fn open(&mut self, base_image: &str) -> Result<BuildSession<R>, BuildError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BuildError::SessionAlreadyActive);
        }

        let bindings = self.registry.snapshot();
        BuildSession::open(
            self.runtime.clone(),
            self.config.clone(),
            self.events.clone(),
            base_image,
            bindings,
            self.active.clone(),
        )
        .await
    }

    /// Open a session, run `build` with it, and close it afterwards no matter how `build`
    /// returns. If `build` doesn't commit, the container is discarded.
    pub async fn build<T>(
        &mut self,
        base_image: &str,
        build: impl AsyncFnOnce(&mut BuildSession<R>) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        let mut session = self.open(base_image).await?;
        let result = build(&mut session).await;
        let state = session.close().await;
        tracing::debug!("Build session closed in state '{state}'");

        result
    }
}
