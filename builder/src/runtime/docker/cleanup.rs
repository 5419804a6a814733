use std::collections::HashMap;

use bollard::{
    Docker,
    query_parameters::{ListContainersOptionsBuilder, RemoveContainerOptionsBuilder},
};

use crate::{errors::RuntimeError, runtime::is_build_container_name};

/// Forcefully remove a build container. A container that is already gone is not an error.
pub async fn remove_container(docker: &Docker, id: &str) -> Result<(), RuntimeError> {
    let opt = RemoveContainerOptionsBuilder::new().force(true).build();
    match docker.remove_container(id, Some(opt)).await {
        Ok(())
        | Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Remove all build containers named with `prefix`, running or not.
pub async fn prune_build_containers(docker: &Docker, prefix: &str) -> Result<usize, RuntimeError> {
    // The name filter matches substrings, the exact check happens below
    let filters = HashMap::from([("name", vec![prefix])]);
    let list_opt = ListContainersOptionsBuilder::new()
        .all(true)
        .filters(&filters)
        .build();
    let containers = docker.list_containers(Some(list_opt)).await?;

    let mut removed = 0;
    for container in containers {
        let names = container.names.unwrap_or_default();
        if !names.iter().any(|name| is_build_container_name(name, prefix)) {
            continue;
        }
        let Some(id) = container.id else { continue };
        match remove_container(docker, &id).await {
            Ok(()) => {
                tracing::info!("Removed leftover build container '{id}'");
                removed += 1;
            }
            Err(err) => tracing::warn!("Could not remove build container '{id}': {err}"),
        }
    }
    Ok(removed)
}
