use bollard::{
    models::{ContainerCreateBody, HostConfig},
    query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder},
};
use dib_models::VolumeBinding;

use crate::runtime::ContainerSpec;

/// Setup creation of a build container:
/// - Build-time volumes are bind-mounted, since mounts can't be added to an existing container.
/// - The idle command runs under an init process, so the container stops promptly before commit.
pub fn setup_container(spec: &ContainerSpec) -> (ContainerCreateBody, CreateContainerOptions) {
    let container_body = ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        host_config: Some(HostConfig {
            binds: Some(spec.bindings.iter().map(VolumeBinding::bind_spec).collect()),
            init: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let container_options = CreateContainerOptionsBuilder::new().name(&spec.name).build();

    (container_body, container_options)
}
