//! In-memory container runtime for tests

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use dib_models::{CommitSpec, VolumeBinding};
use futures::StreamExt;
use tokio::io::AsyncReadExt;

use crate::{
    archive::ArchiveStream,
    errors::RuntimeError,
    events::EventSink,
    runtime::{ContainerRuntime, ContainerSpec, ExecSpec},
};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub name: String,
    pub image: String,
    pub bindings: Vec<VolumeBinding>,
    pub running: bool,
}

/// File extracted into a container by an upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub container_id: String,
    pub dst: String,
    pub path: String,
    pub content: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Clone)]
pub struct FakeImage {
    pub id: String,
    pub spec: CommitSpec,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub images: HashSet<String>,
    pub containers: HashMap<String, FakeContainer>,
    /// Committed images by `repository:tag`
    pub committed: HashMap<String, FakeImage>,
    pub execs: Vec<ExecSpec>,
    pub uploads: Vec<UploadedFile>,
    /// Exit code for commands whose last argument equals the key
    pub exit_codes: HashMap<String, i64>,
    pub fail_create: bool,
    pub fail_start: bool,
    pub fail_exec: bool,
    /// Fail uploads without reading the archive
    pub fail_upload: bool,
    pub fail_commit: bool,
    pub fail_remove: bool,
    next_id: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn with_images(images: &[&str]) -> Self {
        let runtime = Self::default();
        runtime
            .state()
            .images
            .extend(images.iter().map(|image| (*image).to_owned()));
        runtime
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Make commands ending with `last_arg` exit with `exit_code`
    pub fn exit_code(&self, last_arg: &str, exit_code: i64) {
        self.state().exit_codes.insert(last_arg.to_owned(), exit_code);
    }

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }

    pub fn image(&self, reference: &str) -> Option<FakeImage> {
        self.state().committed.get(reference).cloned()
    }

    fn running_container(&self, id: &str) -> Result<(), RuntimeError> {
        match self.state().containers.get(id) {
            Some(container) if container.running => Ok(()),
            Some(_) => Err(RuntimeError::Rejected(format!("container '{id}' is not running"))),
            None => Err(RuntimeError::NotFound(format!("container '{id}'"))),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn resolve_image(&self, image: &str, _events: &EventSink) -> Result<(), RuntimeError> {
        match self.state().images.contains(image) {
            true => Ok(()),
            false => Err(RuntimeError::NotFound(format!("image '{image}'"))),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state();
        if state.fail_create {
            return Err(RuntimeError::Rejected(format!("invalid mount config for '{}'", spec.name)));
        }
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        let container = FakeContainer {
            name: spec.name.clone(),
            image: spec.image.clone(),
            bindings: spec.bindings.to_vec(),
            running: false,
        };
        state.containers.insert(id.clone(), container);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        if state.fail_start {
            return Err(RuntimeError::Rejected("container failed to start".into()));
        }
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(format!("container '{id}'"))),
        }
    }

    async fn exec(&self, id: &str, spec: &ExecSpec, events: &EventSink) -> Result<i64, RuntimeError> {
        self.running_container(id)?;
        let exit_code = {
            let mut state = self.state();
            if state.fail_exec {
                return Err(RuntimeError::Rejected("connection reset by daemon".into()));
            }
            state.execs.push(spec.clone());
            spec.command
                .last()
                .and_then(|arg| state.exit_codes.get(arg).copied())
                .unwrap_or(0)
        };
        events.stdout(format!("ran {}", spec.command.join(" "))).await;
        Ok(exit_code)
    }

    async fn upload(&self, id: &str, dst: &str, mut archive: ArchiveStream) -> Result<(), RuntimeError> {
        self.running_container(id)?;
        if self.state().fail_upload {
            return Err(RuntimeError::Rejected("upload".into()));
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = archive.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        let mut files = Vec::new();
        let mut archive = tokio_tar::Archive::new(std::io::Cursor::new(bytes));
        let mut entries = archive.entries()?;
        while let Some(entry) = entries.next().await {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let mode = entry.header().mode()?;
            let mut content = Vec::new();
            entry.read_to_end(&mut content).await?;
            files.push(UploadedFile {
                container_id: id.to_owned(),
                dst: dst.to_owned(),
                path,
                content,
                mode,
            });
        }
        self.state().uploads.extend(files);
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        match self.state().containers.get_mut(id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(format!("container '{id}'"))),
        }
    }

    async fn commit_container(&self, id: &str, spec: &CommitSpec) -> Result<String, RuntimeError> {
        let mut state = self.state();
        if state.fail_commit {
            return Err(RuntimeError::Rejected("no space left on device".into()));
        }
        if !state.containers.contains_key(id) {
            return Err(RuntimeError::NotFound(format!("container '{id}'")));
        }
        state.next_id += 1;
        let image_id = format!("sha256:{:064x}", state.next_id);
        let reference = format!("{}:{}", spec.image.repository, spec.image.tag_or_latest());
        let image = FakeImage {
            id: image_id.clone(),
            spec: spec.clone(),
        };
        state.committed.insert(reference, image);
        Ok(image_id)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        if state.fail_remove {
            return Err(RuntimeError::Rejected("removal of container is already in progress".into()));
        }
        state.containers.remove(id);
        Ok(())
    }
}
