use bollard::{Docker, models::CreateImageInfo, query_parameters::CreateImageOptionsBuilder};
use futures::{Stream, StreamExt};

use crate::{errors::RuntimeError, events::EventSink};

/// Make sure the image exists locally, pulling it if allowed.
pub async fn resolve_image(
    client: &Docker,
    image: &str,
    pull_missing: bool,
    events: &EventSink,
) -> Result<(), RuntimeError> {
    if exists_image(client, image).await? {
        return Ok(());
    }
    if !pull_missing {
        return Err(RuntimeError::NotFound(format!(
            "image '{image}' does not exist locally and pulling is disabled"
        )));
    }

    pull_image(client, image, events).await?;
    match exists_image(client, image).await? {
        true => Ok(()),
        false => Err(RuntimeError::NotFound(format!("image '{image}' could not be pulled"))),
    }
}

// Check if a Docker image exists locally
pub async fn exists_image(client: &Docker, image: &str) -> Result<bool, RuntimeError> {
    match client.inspect_image(image).await {
        Ok(_) => Ok(true),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Pull the given image and stream progress to the event sink.
async fn pull_image(client: &Docker, image: &str, events: &EventSink) -> Result<(), RuntimeError> {
    events.info(format!("Pulling base image '{image}'...")).await;
    // Without a tag the API pulls every tag of the repository
    let options = if has_tag_or_digest(image) {
        CreateImageOptionsBuilder::new().from_image(image).build()
    } else {
        CreateImageOptionsBuilder::new()
            .from_image(image)
            .tag("latest")
            .build()
    };
    let pull_stream = client.create_image(Some(options), None, None);
    process_pull_stream(pull_stream, events).await
}

fn has_tag_or_digest(image: &str) -> bool {
    let name = image.rsplit('/').next().unwrap_or(image);
    name.contains(':') || name.contains('@')
}

/// Process the pull output from Docker and send progress to the event sink.
async fn process_pull_stream(
    mut pull_stream: impl Stream<Item = Result<CreateImageInfo, bollard::errors::Error>> + Unpin,
    events: &EventSink,
) -> Result<(), RuntimeError> {
    while let Some(result) = pull_stream.next().await {
        let mut info = result?;
        let status = info.status.unwrap_or_default();
        let progress_detail = info.progress_detail.take().unwrap_or_default();
        if let Some((current, total)) = progress_detail.current.zip(progress_detail.total) {
            events
                .debug(format!("Pulling image: {status} {current}/{total}"))
                .await;
        }
        if let Some(error_detail) = info.error_detail {
            events
                .info(format!("Error while pulling image: {error_detail:?}"))
                .await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::has_tag_or_digest;

    #[test]
    fn detects_explicit_tags() {
        assert!(has_tag_or_digest("ubuntu:20.04"));
        assert!(has_tag_or_digest("localhost:5000/app:1"));
        assert!(has_tag_or_digest("alpine@sha256:abcd"));
        assert!(!has_tag_or_digest("ubuntu"));
        assert!(!has_tag_or_digest("localhost:5000/app"));
    }
}
