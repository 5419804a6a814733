//! Package manager helpers, composed from `run`

use dib_models::Command;

use crate::{errors::BuildError, runtime::ContainerRuntime, session::BuildSession};

/// Supported package managers, each with a fixed set of command templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    /// Debian / Ubuntu
    Apt,
    /// Alpine
    Apk,
}

impl PackageManager {
    pub fn update_command(self) -> Command {
        match self {
            PackageManager::Apt => Command::from(["apt-get", "update"]),
            PackageManager::Apk => Command::from(["apk", "update"]),
        }
    }

    pub fn install_command(self, packages: &[String]) -> Command {
        let base: &[&str] = match self {
            PackageManager::Apt => &["apt-get", "install", "-y"],
            PackageManager::Apk => &["apk", "add"],
        };
        let args = base
            .iter()
            .map(|arg| (*arg).to_owned())
            .chain(packages.iter().cloned())
            .collect::<Vec<_>>();
        Command::Exec(args)
    }

    /// Removes package caches so they don't end up in the image
    pub fn clean_command(self) -> Command {
        match self {
            PackageManager::Apt => Command::from("rm -rf /var/lib/apt/lists/*"),
            PackageManager::Apk => Command::from("rm -rf /var/cache/apk/* /var/cache/distfiles/*"),
        }
    }
}

/// Package manager operations on a build session, see [`BuildSession::apt`] and [`BuildSession::apk`]
pub struct PackageOps<'a, R: ContainerRuntime> {
    session: &'a mut BuildSession<R>,
    manager: PackageManager,
}

impl<R: ContainerRuntime> PackageOps<'_, R> {
    pub fn manager(&self) -> PackageManager {
        self.manager
    }

    /// Refresh the package index
    pub async fn update(self) -> Result<(), BuildError> {
        self.session.run(self.manager.update_command()).await
    }

    /// Install packages non-interactively. Names are validated before anything is run.
    pub async fn install<S: AsRef<str>>(
        self,
        packages: impl IntoIterator<Item = S>,
    ) -> Result<(), BuildError> {
        self.session.ensure_active()?;
        let packages = packages
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect::<Vec<_>>();
        validate_package_names(&packages)?;
        self.session
            .run(self.manager.install_command(&packages))
            .await
    }

    /// Clean up package caches
    pub async fn clean(self) -> Result<(), BuildError> {
        self.session.run(self.manager.clean_command()).await
    }
}

impl<R: ContainerRuntime> BuildSession<R> {
    /// APT helpers for Debian-based images
    pub fn apt(&mut self) -> PackageOps<'_, R> {
        PackageOps {
            session: self,
            manager: PackageManager::Apt,
        }
    }

    /// APK helpers for Alpine-based images
    pub fn apk(&mut self) -> PackageOps<'_, R> {
        PackageOps {
            session: self,
            manager: PackageManager::Apk,
        }
    }
}

fn validate_package_names(packages: &[String]) -> Result<(), BuildError> {
    if packages.is_empty() {
        return Err(BuildError::InvalidPackage {
            name: String::new(),
            reason: "no packages given".into(),
        });
    }
    for name in packages {
        validate_package_name(name).map_err(|reason| BuildError::InvalidPackage {
            name: name.to_owned(),
            reason,
        })?;
    }
    Ok(())
}

/// Validate a package name so it can't be mistaken for an option or smuggle in shell syntax.
///
/// Allowed characters cover package names, version pins and architecture qualifiers:
///
/// - Alphanumerics and `_`, `-`, `.`, `+` (`libstdc++6`)
/// - `=` for version pins (`curl=7.68.0-1ubuntu2`, `apk add musl=1.2.3-r0`)
/// - `:` for architectures (`libc6:i386`) and epochs
/// - `~`, `<`, `>` for version ranges and Debian pre-release versions
fn validate_package_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("package name must not be empty".into());
    }
    if name.starts_with('-') {
        return Err("package name must not start with '-'".into());
    }

    let invalid_char = name.chars().find(|c| !is_safe_package_char(*c));

    if let Some(ch) = invalid_char {
        return Err(format!(
            "package name contains forbidden character {ch:?}, \
             only alphanumerics and _ - . + = : ~ < > are allowed",
        ));
    }

    Ok(())
}

fn is_safe_package_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '_' | '-' | '.' | '+' | '=' | ':' | '~' | '<' | '>')
}
