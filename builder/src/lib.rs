//! # dib
//!
//! Build container images step by step against a live container, with host volumes
//! mounted while the build runs, something a Dockerfile can't express.
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use dib::{BuildContext, BuilderConfig, DockerRuntime};
//!
//! let config = BuilderConfig::default();
//! let runtime = DockerRuntime::connect(&config).await?;
//! let mut context = BuildContext::new(runtime, config);
//! context.buildtime_volume("./cache", "/var/cache/apt/archives")?;
//!
//! let outcome = context
//!     .build("ubuntu:20.04", async |session| {
//!         session.apt().update().await?;
//!         session.apt().install(["curl"]).await?;
//!         session.workdir("/app").await?;
//!         session.cmd(["curl", "--version"]).await?;
//!         session.commit("curl-image:latest").await
//!     })
//!     .await?;
//! println!("{}", outcome.image_id);
//! # Ok(())
//! # }
//! ```

mod archive;
mod config;
mod context;
mod errors;
mod events;
mod registry;
mod runtime;
mod session;

#[cfg(test)]
mod testing;

pub use archive::ArchiveStream;
pub use config::{BuilderConfig, extract_config};
pub use context::BuildContext;
pub use errors::{BuildError, ErrorKind, RuntimeError};
pub use events::EventSink;
pub use registry::VolumeBindingRegistry;
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, ExecSpec};
pub use session::{
    BuildSession, CommitOptions, CommitOutcome, PackageManager, PackageOps, SessionState,
};

pub use dib_models as models;
