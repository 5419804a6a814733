use std::fmt::{self, Display};

use oci_distribution::Reference;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Repository and optional tag to commit an image as, e.g. `ghcr.io/org/app:1.0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageReference {
    /// The repository as given, without registry defaults filled in
    pub repository: String,
    /// The tag, or `None` for the runtime's default (`latest`)
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("{0}")]
    Invalid(String),
    #[error("digest references can not be used as a commit target")]
    Digest,
}

impl ImageReference {
    /// Parse `REPOSITORY[:TAG]` following the Docker reference grammar.
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        if reference.contains('@') {
            return Err(ReferenceError::Digest);
        }
        let parsed = Reference::try_from(reference)
            .map_err(|err| ReferenceError::Invalid(err.to_string()))?;
        if parsed.digest().is_some() {
            return Err(ReferenceError::Digest);
        }

        // Keep the name as given so Docker Hub images aren't committed as `docker.io/library/...`
        let explicit_tag = parsed
            .tag()
            .and_then(|tag| Some((reference.strip_suffix(tag)?.strip_suffix(':')?, tag)));
        Ok(match explicit_tag {
            Some((repository, tag)) => Self {
                repository: repository.to_owned(),
                tag: Some(tag.to_owned()),
            },
            None => Self {
                repository: reference.to_owned(),
                tag: None,
            },
        })
    }

    /// The tag, defaulting to `latest`
    pub fn tag_or_latest(&self) -> &str {
        self.tag.as_deref().unwrap_or("latest")
    }
}

impl Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{tag}", self.repository),
            None => f.write_str(&self.repository),
        }
    }
}
