//! Build operations applied to an active session

use std::path::Path;

use dib_models::{Command, CopyOptions, Operation};

use crate::{
    archive,
    errors::{BuildError, RuntimeError},
    runtime::{ContainerRuntime, ExecSpec},
    session::BuildSession,
};

/// User that runs housekeeping commands such as `chown` after a copy
const ROOT_USER: &str = "0";

impl<R: ContainerRuntime> BuildSession<R> {
    /// Set the working directory. Relative paths are resolved against the current one.
    /// Later `run` steps execute in it and `copy` resolves relative destinations against it.
    pub async fn workdir(&mut self, path: &str) -> Result<(), BuildError> {
        self.ensure_active()?;
        let workdir = self.resolve(path);
        self.events.info(format!("WORKDIR {workdir}")).await;
        self.pending.workdir = Some(workdir);
        Ok(())
    }

    /// Run a command in the build container as the current user and working directory.
    /// A non-zero exit code fails the build.
    pub async fn run(&mut self, command: impl Into<Command>) -> Result<(), BuildError> {
        self.ensure_active()?;
        let command = command.into();
        self.events.info(format!("RUN {command}")).await;
        let spec = ExecSpec {
            command: command.to_argv(&self.config.shell),
            user: self.pending.user.clone(),
            workdir: self.pending.workdir.clone(),
        };
        self.exec_checked(spec, command.to_string()).await
    }

    /// Copy a host file or directory into the directory `container_path` of the build
    /// container. The archive entry keeps the source's file name.
    pub async fn copy(
        &mut self,
        host_path: impl AsRef<Path>,
        container_path: &str,
        options: CopyOptions,
    ) -> Result<(), BuildError> {
        self.ensure_active()?;
        let source = host_path.as_ref();
        let metadata = match tokio::fs::metadata(source).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BuildError::SourceNotFound(source.to_owned()));
            }
            Err(err) => {
                return Err(BuildError::HostIo {
                    path: source.to_owned(),
                    source: err,
                });
            }
        };
        if !metadata.is_file() && (options.crlf_to_lf || options.mode.is_some()) {
            return Err(BuildError::InvalidCopy(format!(
                "line ending conversion and mode changes need a regular file, but {} is not one",
                source.display()
            )));
        }
        let name = archive::entry_name(source).ok_or_else(|| {
            BuildError::InvalidCopy(format!("{} has no file name", source.display()))
        })?;

        let destination = self.resolve(container_path);
        self.events
            .info(format!("COPY {} {destination}", source.display()))
            .await;
        let (archive, packer) = archive::pack(source.to_owned(), name.clone(), options);
        let uploaded = self
            .runtime
            .upload(&self.container_id, &destination, archive)
            .await;
        let packed = match packer.await {
            Ok(result) => result.map_err(RuntimeError::Io),
            Err(err) => Err(RuntimeError::Io(std::io::Error::other(err))),
        };
        if let Err(err) = uploaded.and(packed) {
            let err = BuildError::Copy {
                path: source.to_owned(),
                source: err,
            };
            return Err(self.abort(err).await);
        }

        // The archive is extracted as root, hand it over to the current user
        if let Some(user) = self.pending.user.clone() {
            let target = join(&destination, &name.to_string_lossy());
            let command = vec!["chown".into(), "-R".into(), user, target];
            let spec = ExecSpec {
                command: command.clone(),
                user: Some(ROOT_USER.into()),
                workdir: None,
            };
            self.exec_checked(spec, Command::Exec(command).to_string())
                .await?;
        }
        Ok(())
    }

    /// Set the user for later `run`, `copy` and the image. Whether the user exists is
    /// not checked until it is used.
    pub async fn user(&mut self, name: &str) -> Result<(), BuildError> {
        self.ensure_active()?;
        if name.is_empty() || name.starts_with(':') || name.ends_with(':') {
            return Err(BuildError::InvalidImageConfig(format!(
                "user '{name}' must have a non-empty name and group"
            )));
        }
        self.events.info(format!("USER {name}")).await;
        self.pending.user = Some(name.to_owned());
        Ok(())
    }

    /// Set the user and group, see [`user`](Self::user).
    pub async fn user_group(&mut self, name: &str, group: &str) -> Result<(), BuildError> {
        self.user(&format!("{name}:{group}")).await
    }

    /// Expose ports in the image. Ports that are already exposed are ignored.
    pub async fn expose(&mut self, ports: impl IntoIterator<Item = u16>) -> Result<(), BuildError> {
        self.ensure_active()?;
        for port in ports {
            if self.pending.exposed_ports.insert(port) {
                self.events.info(format!("EXPOSE {port}")).await;
            }
        }
        Ok(())
    }

    /// Declare volume mount points in the image. These are image metadata only,
    /// unlike build-time volumes. Paths must be absolute.
    pub async fn volume<S: Into<String>>(
        &mut self,
        paths: impl IntoIterator<Item = S>,
    ) -> Result<(), BuildError> {
        self.ensure_active()?;
        let paths = paths.into_iter().map(Into::into).collect::<Vec<String>>();
        if let Some(relative) = paths.iter().find(|path| !path.starts_with('/')) {
            return Err(BuildError::InvalidImageConfig(format!(
                "volume path '{relative}' must be absolute"
            )));
        }
        for path in paths {
            self.events.info(format!("VOLUME {path}")).await;
            self.pending.volumes.insert(path);
        }
        Ok(())
    }

    /// Set the default command of the image, replacing any earlier one.
    pub async fn cmd(&mut self, command: impl Into<Command>) -> Result<(), BuildError> {
        self.ensure_active()?;
        let command = command.into();
        self.events.info(format!("CMD {command}")).await;
        self.pending.cmd = Some(command.to_argv(&self.config.shell));
        Ok(())
    }

    /// Set the entrypoint of the image, replacing any earlier one.
    pub async fn entrypoint(&mut self, command: impl Into<Command>) -> Result<(), BuildError> {
        self.ensure_active()?;
        let command = command.into();
        self.events.info(format!("ENTRYPOINT {command}")).await;
        self.pending.entrypoint = Some(command.to_argv(&self.config.shell));
        Ok(())
    }

    /// Apply a single build plan step
    pub async fn apply(&mut self, operation: &Operation) -> Result<(), BuildError> {
        match operation {
            Operation::Workdir { path } => self.workdir(path).await,
            Operation::Run { command } => self.run(command.clone()).await,
            Operation::Copy {
                src,
                dst,
                crlf_to_lf,
                mode,
            } => {
                let options = CopyOptions {
                    crlf_to_lf: *crlf_to_lf,
                    mode: *mode,
                };
                self.copy(src, dst, options).await
            }
            Operation::User { name, group: None } => self.user(name).await,
            Operation::User {
                name,
                group: Some(group),
            } => self.user_group(name, group).await,
            Operation::Expose { ports } => self.expose(ports.iter().copied()).await,
            Operation::Volume { paths } => self.volume(paths.iter().cloned()).await,
            Operation::Cmd { command } => self.cmd(command.clone()).await,
            Operation::Entrypoint { command } => self.entrypoint(command.clone()).await,
            Operation::AptUpdate => self.apt().update().await,
            Operation::AptInstall { packages } => self.apt().install(packages).await,
            Operation::AptClean => self.apt().clean().await,
            Operation::ApkUpdate => self.apk().update().await,
            Operation::ApkAdd { packages } => self.apk().install(packages).await,
            Operation::ApkClean => self.apk().clean().await,
        }
    }

    /// Execute in the container, discarding the session on a runtime error or non-zero exit.
    pub(crate) async fn exec_checked(
        &mut self,
        spec: ExecSpec,
        display: String,
    ) -> Result<(), BuildError> {
        let result = self
            .runtime
            .exec(&self.container_id, &spec, &self.events)
            .await;
        match result {
            Ok(0) => Ok(()),
            Ok(exit_code) => {
                let err = BuildError::CommandExecution {
                    command: display,
                    exit_code,
                };
                Err(self.abort(err).await)
            }
            Err(err) => {
                let err = BuildError::Exec {
                    command: display,
                    source: err,
                };
                Err(self.abort(err).await)
            }
        }
    }

    /// Resolve a container path against the pending working directory
    fn resolve(&self, path: &str) -> String {
        match &self.pending.workdir {
            Some(workdir) => join(workdir, path),
            None => join("/", path),
        }
    }
}

/// Join `path` onto `base` with POSIX semantics and normalize `.` and `..` components.
/// An absolute `path` replaces `base`.
fn join(base: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("{base}/{path}")
    };

    let mut components: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            component => components.push(component),
        }
    }
    format!("/{}", components.join("/"))
}
