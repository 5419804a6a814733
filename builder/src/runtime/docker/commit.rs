use bollard::{
    Docker, models::ContainerConfig, query_parameters::CommitContainerOptionsBuilder,
};
use dib_models::{CommitSpec, ImageConfig};

use crate::errors::RuntimeError;

/// Commit the container as a new image, applying the image config as Dockerfile instructions.
pub async fn commit_container(
    client: &Docker,
    id: &str,
    spec: &CommitSpec,
) -> Result<String, RuntimeError> {
    // Without a CMD of its own, the image would inherit the idle command of the build container
    let base_cmd = match spec.config.cmd {
        Some(_) => None,
        None => base_image_cmd(client, id).await?,
    };
    let changes = render_changes(&spec.config, base_cmd.as_deref()).join("\n");
    tracing::debug!("Committing container '{id}' with changes:\n{changes}");

    let mut options = CommitContainerOptionsBuilder::new()
        .container(id)
        .repo(&spec.image.repository)
        .tag(spec.image.tag_or_latest())
        .pause(false)
        .changes(&changes);
    if let Some(author) = &spec.author {
        options = options.author(author);
    }
    if let Some(message) = &spec.message {
        options = options.comment(message);
    }

    let response = client
        .commit_container(options.build(), ContainerConfig::default())
        .await?;
    Ok(response.id)
}

/// The CMD of the image the container was created from
async fn base_image_cmd(client: &Docker, id: &str) -> Result<Option<Vec<String>>, RuntimeError> {
    let container = client.inspect_container(id, None::<bollard::query_parameters::InspectContainerOptions>).await?;
    let Some(image_id) = container.image else {
        return Ok(None);
    };
    let image = client.inspect_image(&image_id).await?;
    Ok(image.config.and_then(|config| config.cmd))
}

/// Render the image config as the Dockerfile instructions understood by the commit API
pub fn render_changes(config: &ImageConfig, base_cmd: Option<&[String]>) -> Vec<String> {
    let mut changes = Vec::new();
    if let Some(cmd) = config.cmd.as_deref().or(base_cmd) {
        changes.push(format!("CMD {}", json(cmd)));
    }
    if let Some(entrypoint) = &config.entrypoint {
        changes.push(format!("ENTRYPOINT {}", json(entrypoint)));
    }
    if let Some(user) = &config.user {
        changes.push(format!("USER {user}"));
    }
    if let Some(workdir) = &config.workdir {
        changes.push(format!("WORKDIR {}", json(workdir)));
    }
    for port in &config.exposed_ports {
        changes.push(format!("EXPOSE {port}"));
    }
    for volume in &config.volumes {
        changes.push(format!("VOLUME {}", json(&[volume])));
    }
    changes
}

fn json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_instructions() {
        let config = ImageConfig {
            workdir: Some("/app".into()),
            user: Some("app:app".into()),
            exposed_ports: [443, 80].into(),
            volumes: ["/data".to_owned()].into(),
            cmd: Some(vec!["echo".into(), "hi".into()]),
            entrypoint: Some(vec!["/entrypoint.sh".into()]),
        };

        assert_eq!(
            render_changes(&config, None),
            [
                r#"CMD ["echo","hi"]"#,
                r#"ENTRYPOINT ["/entrypoint.sh"]"#,
                "USER app:app",
                r#"WORKDIR "/app""#,
                "EXPOSE 80",
                "EXPOSE 443",
                r#"VOLUME ["/data"]"#,
            ]
        );
    }

    #[test]
    fn falls_back_to_base_image_cmd() {
        let base_cmd = vec!["bash".to_owned()];
        let changes = render_changes(&ImageConfig::default(), Some(&base_cmd));
        assert_eq!(changes, [r#"CMD ["bash"]"#]);

        let config = ImageConfig {
            cmd: Some(vec!["nginx".into()]),
            ..Default::default()
        };
        assert_eq!(render_changes(&config, Some(&base_cmd)), [r#"CMD ["nginx"]"#]);
    }

    #[test]
    fn empty_config_has_no_changes() {
        assert!(render_changes(&ImageConfig::default(), None).is_empty());
    }
}
