//! Build-time volume registry

use std::{path::Path, sync::Arc};

use dib_models::VolumeBinding;

use crate::errors::BuildError;

/// Collects build-time volume bindings before the build container exists.
/// Container runtimes only accept mounts at creation time, so the registry is
/// closed once a session takes its [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct VolumeBindingRegistry {
    bindings: Vec<VolumeBinding>,
    frozen: Option<Arc<[VolumeBinding]>>,
}

impl VolumeBindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read-write bind of `host_path` to `container_path`.
    pub fn register(
        &mut self,
        host_path: impl Into<String>,
        container_path: impl Into<String>,
    ) -> Result<(), BuildError> {
        self.register_binding(VolumeBinding::new(host_path, container_path))
    }

    /// Register a binding. A binding for a container path that is already
    /// registered replaces the earlier one.
    pub fn register_binding(&mut self, binding: VolumeBinding) -> Result<(), BuildError> {
        if self.frozen.is_some() {
            return Err(BuildError::RegistryClosed);
        }
        if binding.host_path.is_empty() {
            return Err(BuildError::InvalidBinding("host path must not be empty".into()));
        }
        if !binding.container_path.starts_with('/') {
            return Err(BuildError::InvalidBinding(format!(
                "container path '{}' must be absolute",
                binding.container_path
            )));
        }

        let binding = VolumeBinding {
            host_path: absolutize_host_path(&binding.host_path)?,
            ..binding
        };
        match self
            .bindings
            .iter_mut()
            .find(|b| b.container_path == binding.container_path)
        {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
        Ok(())
    }

    /// Freeze the registry and return the bindings in registration order.
    pub fn snapshot(&mut self) -> Arc<[VolumeBinding]> {
        self.frozen
            .get_or_insert_with(|| std::mem::take(&mut self.bindings).into())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.frozen.is_some()
    }
}

/// Host paths that start with `.`/`..` or contain a separator are resolved against the
/// current directory. Bare names are left alone since they refer to named volumes.
fn absolutize_host_path(host_path: &str) -> Result<String, BuildError> {
    let path = Path::new(host_path);
    if path.is_absolute() || !(host_path.starts_with('.') || host_path.contains('/')) {
        return Ok(host_path.to_owned());
    }

    let absolute = std::path::absolute(path).map_err(|err| {
        BuildError::InvalidBinding(format!("could not resolve host path '{host_path}': {err}"))
    })?;
    Ok(absolute.to_string_lossy().into_owned())
}
